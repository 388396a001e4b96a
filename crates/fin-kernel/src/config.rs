//! Boot configuration for a kernel.

use serde::Deserialize;

/// What a kernel sets up when it starts.
///
/// Deserializable so hosts can load it from TOML; missing keys fall back to
/// [`KernelConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Name of this computer (used in logs).
    pub name: String,
    /// Where the device listing is mounted at boot. `None` leaves it unmounted
    /// until `init_filesystem` is called.
    pub dev_path: Option<String>,
    /// Mount a fresh in-memory drive at `/` at boot.
    pub root_tmpfs: bool,
    /// Mount an extra in-memory scratch device here at boot.
    pub tmp_mount: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "computer".to_string(),
            dev_path: Some("/dev".to_string()),
            root_tmpfs: false,
            tmp_mount: None,
        }
    }
}

impl KernelConfig {
    /// A self-contained computer: in-memory root, no device listing mounted.
    pub fn isolated() -> Self {
        Self {
            name: "isolated".to_string(),
            dev_path: None,
            root_tmpfs: true,
            tmp_mount: None,
        }
    }

    /// A computer with the given name and default boot layout.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.dev_path.as_deref(), Some("/dev"));
        assert!(!config.root_tmpfs);
        assert!(config.tmp_mount.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"name": "base", "tmp_mount": "/tmp"}"#).unwrap();
        assert_eq!(config.name, "base");
        assert_eq!(config.tmp_mount.as_deref(), Some("/tmp"));
        assert_eq!(config.dev_path.as_deref(), Some("/dev"));
    }

    #[test]
    fn test_isolated() {
        let config = KernelConfig::isolated();
        assert!(config.root_tmpfs);
        assert!(config.dev_path.is_none());
    }
}
