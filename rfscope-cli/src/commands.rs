//! CLI subcommand handlers.

use crate::AuthAction;
use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use rfscope_core::assistant::KEYCHAIN_ACCOUNT;
use rfscope_core::config::{load_from, load_validated, workspace_config_path, RfscopeConfig};
use rfscope_core::secrets::{CredentialStore, KeyringCredentialStore, SecretRef};
use rfscope_core::{
    build_assistant, run_gateway, GatewayServer, ImageDimensions, LayerFile, LayerSpec,
    ReceptiveFieldEngine,
};
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Trace {
            input,
            image,
            layers,
            file,
            json,
        } => {
            let request = TraceRequest {
                input,
                image,
                layers,
                file,
                json,
            };
            print!("{}", run_trace(&request)?);
            Ok(())
        }
        Commands::Serve { host, port } => {
            let config = load_validated(Some(workspace), config_file)?;
            handle_serve(config, host, port).await
        }
        Commands::Ask { question, probe } => {
            let config = load_validated(Some(workspace), config_file)?;
            handle_ask(config, question, probe).await
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
        Commands::Auth { action } => {
            let config = load_unvalidated(workspace, config_file)?;
            let store = KeyringCredentialStore::new();
            handle_auth(action, &store, &config.assistant.api_key)
        }
    }
}

/// Layered configuration including the `-c` file, without rejecting
/// invalid values so they can still be inspected.
fn load_unvalidated(
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<RfscopeConfig> {
    load_from(Some(workspace), config_file).context("Failed to load config")
}

/// Arguments of `rfscope trace`.
#[derive(Debug, Default)]
pub struct TraceRequest {
    pub input: Option<String>,
    pub image: Option<PathBuf>,
    pub layers: Vec<String>,
    pub file: Option<PathBuf>,
    pub json: bool,
}

/// Parse `HxW` or `HxWxC` into signed dimensions; channels default to 3.
pub fn parse_input(spec: &str) -> anyhow::Result<(i64, i64, i64)> {
    let parts: Vec<&str> = spec.split(['x', 'X']).map(str::trim).collect();
    let numbers = parts
        .iter()
        .map(|p| p.parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid input '{spec}': expected HxW or HxWxC"))?;
    match numbers.as_slice() {
        [h, w] => Ok((*h, *w, 3)),
        [h, w, c] => Ok((*h, *w, *c)),
        _ => anyhow::bail!("Invalid input '{spec}': expected HxW or HxWxC"),
    }
}

/// Build the engine described by `request` and render its trace.
pub fn run_trace(request: &TraceRequest) -> anyhow::Result<String> {
    let mut engine = ReceptiveFieldEngine::new();

    if let Some(path) = &request.file {
        LayerFile::from_path(path)?.apply_to(&mut engine)?;
    }

    if let Some(spec) = &request.input {
        let (height, width, channels) = parse_input(spec)?;
        engine.set_input_dimensions(height, width, channels)?;
    } else if let Some(path) = &request.image {
        let dims = ImageDimensions::from_path(path)?;
        tracing::debug!(path = %path.display(), ?dims, "Input taken from image");
        engine.set_input_dimensions(
            i64::from(dims.height),
            i64::from(dims.width),
            i64::from(dims.channels),
        )?;
    }

    let layers = request
        .layers
        .iter()
        .map(|spec| spec.parse::<LayerSpec>()?.into_descriptor())
        .collect::<Result<Vec<_>, _>>()?;
    let trace = engine.extend_layers(layers);

    if request.json {
        Ok(format!("{}\n", serde_json::to_string_pretty(&trace)?))
    } else {
        Ok(crate::render::render_trace(&trace))
    }
}

async fn handle_serve(
    mut config: RfscopeConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let store = KeyringCredentialStore::new();
    let mut server = GatewayServer::new(config.gateway.clone());
    match build_assistant(&config.assistant, &store) {
        Ok(Some(assistant)) => server = server.with_assistant(assistant),
        Ok(None) => tracing::info!("Assistant disabled; chat routes will report it"),
        Err(e) => tracing::warn!(error = %e, "Assistant unavailable; chat routes will report it"),
    }

    println!("rfscope listening on http://{}", config.gateway.bind_addr());
    run_gateway(server.into_shared())
        .await
        .with_context(|| format!("Gateway failed on {}", config.gateway.bind_addr()))
}

async fn handle_ask(
    config: RfscopeConfig,
    question: Option<String>,
    probe: bool,
) -> anyhow::Result<()> {
    // Asking from the command line is an explicit request, so the `enabled`
    // switch that gates the server's chat routes does not apply here.
    let mut assistant_config = config.assistant;
    assistant_config.enabled = true;

    let store = KeyringCredentialStore::new();
    let assistant = build_assistant(&assistant_config, &store)
        .map_err(|e| anyhow::anyhow!("{}\n({})", e.user_message(), e))?
        .context("Assistant could not be created")?;

    let reply = if probe {
        assistant.probe().await
    } else {
        let question = question.unwrap_or_default();
        let question = question.trim();
        if question.is_empty() {
            anyhow::bail!("Message cannot be empty");
        }
        assistant.ask(question).await
    };

    match reply {
        Ok(text) => {
            println!("{}", text.trim_end());
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e.user_message())),
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&RfscopeConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let (toml_str, problems) = show_config(workspace, config_file)?;
            println!("{}", toml_str);
            for problem in problems {
                eprintln!("warning: {problem}");
            }
            Ok(())
        }
    }
}

/// Effective configuration as TOML with an inline key redacted, plus any
/// validation problems.
fn show_config(
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<(String, Vec<String>)> {
    let mut config = load_unvalidated(workspace, config_file)?;
    if config.assistant.api_key.is_inline() {
        config.assistant.api_key = SecretRef::inline("<redacted>");
    }
    Ok((toml::to_string_pretty(&config)?, config.validate()))
}

fn handle_auth(
    action: AuthAction,
    store: &dyn CredentialStore,
    configured: &SecretRef,
) -> anyhow::Result<()> {
    match action {
        AuthAction::Set { key } => {
            let key = match key {
                Some(key) => key,
                None => {
                    eprintln!("Paste the API key and press Enter:");
                    let mut line = String::new();
                    std::io::stdin().read_line(&mut line)?;
                    line
                }
            };
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("API key must not be empty");
            }
            store.store_key(KEYCHAIN_ACCOUNT, key)?;
            println!("Stored the API key in the OS keychain.");

            let expected = SecretRef::keychain(KEYCHAIN_ACCOUNT);
            if *configured != expected {
                println!(
                    "Set `api_key = \"{}\"` under [assistant] to use it.",
                    expected.as_str()
                );
            }
            Ok(())
        }
        AuthAction::Delete => {
            store.delete_key(KEYCHAIN_ACCOUNT)?;
            println!("Removed the API key from the OS keychain.");
            Ok(())
        }
        AuthAction::Status => {
            print!("{}", auth_status(store, configured));
            Ok(())
        }
    }
}

fn auth_status(store: &dyn CredentialStore, configured: &SecretRef) -> String {
    let stored = if store.has_key(KEYCHAIN_ACCOUNT) {
        "stored"
    } else {
        "not stored"
    };
    let source = if configured.is_inline() {
        "<inline>"
    } else {
        configured.as_str()
    };
    let resolved = match configured.resolve(store) {
        Ok(_) => "resolves".to_string(),
        Err(e) => format!("does not resolve: {e}"),
    };
    format!("Keychain ({KEYCHAIN_ACCOUNT}): {stored}\nConfigured api_key: {source} ({resolved})\n")
}
