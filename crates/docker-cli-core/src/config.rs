use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DockerCliError, Result};

const CONFIG_FILE: &str = "config.json";
const CONFIG_DIR_ENV: &str = "DOCKER_CONFIG";
const DEFAULT_CONFIG_DIR: &str = ".docker";

/// The CLI configuration file (`config.json`).
///
/// Only the keys the plugin manager consumes are modelled; everything else is
/// kept verbatim in `extra` so other commands can own it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    /// Additional directories searched for CLI plugins, in precedence order
    #[serde(
        default,
        rename = "cliPluginsExtraDirs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub cli_plugins_extra_dirs: Vec<String>,

    /// Context selected with `docker context use`
    #[serde(
        default,
        rename = "currentContext",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigFile {
    /// Load config from the config directory
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = Self::path(config_dir);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: ConfigFile =
            serde_json::from_str(&content).map_err(|e| DockerCliError::ConfigParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(config)
    }

    /// Get config file path
    pub fn path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE)
    }

    /// Extra plugin directories with a leading `~/` expanded
    pub fn plugin_extra_dirs(&self) -> Vec<PathBuf> {
        self.cli_plugins_extra_dirs
            .iter()
            .map(|d| expand_home(d))
            .collect()
    }
}

/// Resolve the configuration directory.
///
/// Order: explicit `--config` flag, `DOCKER_CONFIG`, then `~/.docker`.
pub fn resolve_config_dir(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }

    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::home_dir()
        .map(|h| h.join(DEFAULT_CONFIG_DIR))
        .ok_or(DockerCliError::HomeNotFound)
}

fn expand_home(dir: &str) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(dir)
}
