//! Configuration system for rfscope.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment -> explicit overrides. Configuration is loaded from
//! `~/.config/rfscope/config.toml` and/or `.rfscope/config.toml` in the
//! workspace directory.

use crate::assistant::AssistantConfig;
use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name of the workspace-local configuration.
pub const WORKSPACE_CONFIG_DIR: &str = ".rfscope";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RfscopeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

impl RfscopeConfig {
    /// Return a list of human-readable problems; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.gateway.port == 0 {
            problems.push("gateway.port must be non-zero".to_string());
        }
        if self.gateway.max_upload_bytes == 0 {
            problems.push("gateway.max_upload_bytes must be non-zero".to_string());
        }
        if self.gateway.max_sessions == 0 {
            problems.push("gateway.max_sessions must be at least 1".to_string());
        }
        if self.assistant.enabled {
            if self.assistant.model.trim().is_empty() {
                problems.push("assistant.model must not be empty".to_string());
            }
            if self.assistant.api_key.is_empty() {
                problems.push("assistant.api_key must reference a secret".to_string());
            }
            if self.assistant.timeout_secs == 0 {
                problems.push("assistant.timeout_secs must be non-zero".to_string());
            }
        }
        problems
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "rfscope", "rfscope")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RFSCOPE_`, nested with `__`)
/// 3. Workspace-local config (`.rfscope/config.toml`)
/// 4. User config (`~/.config/rfscope/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RfscopeConfig>,
) -> Result<RfscopeConfig, Box<figment::Error>> {
    let mut figment = layered_figment(workspace, None);
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }
    figment.extract().map_err(Box::new)
}

/// Load configuration like [`load_config`], with an optional explicit file
/// merged above the workspace config. The result is not validated.
pub fn load_from(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<RfscopeConfig, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    layered_figment(workspace, explicit)
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// [`load_from`], rejecting configurations that fail [`RfscopeConfig::validate`].
pub fn load_validated(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<RfscopeConfig, ConfigError> {
    let config = load_from(workspace, explicit)?;
    let problems = config.validate();
    if !problems.is_empty() {
        return Err(ConfigError::Invalid {
            message: problems.join("; "),
        });
    }
    Ok(config)
}

fn layered_figment(workspace: Option<&Path>, explicit: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(RfscopeConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // RFSCOPE_GATEWAY__PORT, RFSCOPE_ASSISTANT__MODEL, ...
    figment.merge(Env::prefixed("RFSCOPE_").split("__"))
}
