//! Shell configuration and XDG paths.
//!
//! | Purpose | XDG Variable | Default | fin Path |
//! |---------|--------------|---------|----------|
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` | `$XDG_CONFIG_HOME/fin/config.toml` |
//! | History | `$XDG_DATA_HOME` | `~/.local/share` | `$XDG_DATA_HOME/fin/history.txt` |
//!
//! Example `config.toml`:
//!
//! ```toml
//! history = true
//!
//! [kernel]
//! name = "base"
//! root_tmpfs = true
//! tmp_mount = "/tmp"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

use fin_kernel::KernelConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Boot layout of the shell's kernel.
    pub kernel: KernelConfig,
    /// Load and save line history.
    pub history: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            kernel: KernelConfig {
                name: "fin".to_string(),
                root_tmpfs: true,
                tmp_mount: Some("/tmp".to_string()),
                ..KernelConfig::default()
            },
            history: true,
        }
    }
}

impl ReplConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Load the config from `explicit`, else from the default location, else defaults.
///
/// An explicit path must exist; the default location may be absent.
pub fn load_config(explicit: Option<&Path>) -> Result<ReplConfig> {
    if let Some(path) = explicit {
        return ReplConfig::from_file(path);
    }
    let path = config_dir().join("config.toml");
    if path.is_file() {
        tracing::debug!(path = %path.display(), "repl: loading config");
        ReplConfig::from_file(&path)
    } else {
        Ok(ReplConfig::default())
    }
}

/// `$XDG_CONFIG_HOME/fin`, or `~/.config/fin`.
pub fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".config"))
        .join("fin")
}

/// `$XDG_DATA_HOME/fin`, or `~/.local/share/fin`.
pub fn data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".local").join("share"))
        .join("fin")
}

pub fn history_path() -> PathBuf {
    data_dir().join("history.txt")
}

fn home_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}
