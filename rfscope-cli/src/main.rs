//! rfscope CLI: receptive-field calculator for CNN layer stacks.
//!
//! Computes traces from the command line, serves the HTTP API and manages
//! configuration and the assistant API key.

mod commands;
mod render;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// rfscope: layer-by-layer receptive field, jump and output-size calculator
#[derive(Parser, Debug)]
#[command(name = "rfscope", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Compute the geometry trace of a layer stack
    Trace {
        /// Input dimensions as HxW or HxWxC (default 224x224x3)
        #[arg(short, long, conflicts_with = "image")]
        input: Option<String>,

        /// Take the input dimensions from an image file
        #[arg(long)]
        image: Option<PathBuf>,

        /// Layer in compact form, e.g. conv:k=3,s=1,p=1 or maxpool:k=2,s=2 (repeatable)
        #[arg(short, long = "layer")]
        layers: Vec<String>,

        /// TOML or JSON layer file, applied before any --layer
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP API
    Serve {
        /// Host to bind to (overrides gateway.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides gateway.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask the assistant a question
    Ask {
        /// The question
        #[arg(required_unless_present = "probe")]
        question: Option<String>,

        /// Send a short test prompt to check the API key and model
        #[arg(long)]
        probe: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the assistant API key in the OS keychain
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[derive(clap::Subcommand, Debug)]
enum AuthAction {
    /// Store the API key (read from stdin when omitted)
    Set {
        /// The API key
        key: Option<String>,
    },
    /// Remove the stored API key
    Delete,
    /// Show whether an API key is stored and how the configuration refers to it
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "rfscope", "rfscope")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "rfscope.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
