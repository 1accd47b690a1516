//! Driver configuration
//!
//! Stored as TOML under the user config directory. Every field is optional
//! so a partial or missing file falls back to defaults; command line flags
//! override whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::devices::Model;

fn default_reconnect_delay_ms() -> u64 {
    500
}

/// Serialize a model by name (e.g. `"StreamDeckMK2"`)
fn serialize_model<S: Serializer>(model: &Option<Model>, s: S) -> Result<S::Ok, S::Error> {
    match model {
        Some(model) => s.serialize_str(model.name()),
        None => s.serialize_none(),
    }
}

/// Deserialize a model from a name or a `0x`-prefixed product id
fn deserialize_model<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Model>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|name| name.parse::<Model>().map_err(serde::de::Error::custom))
        .transpose()
}

/// Persistent driver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckConfig {
    /// Model to open; any supported model when unset
    #[serde(
        default,
        serialize_with = "serialize_model",
        deserialize_with = "deserialize_model",
        skip_serializing_if = "Option::is_none"
    )]
    pub device: Option<Model>,
    /// Serial number of the unit to open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Brightness applied after opening, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Give up reconnecting after this long, 0 waits until interrupted
    #[serde(default)]
    pub reconnect_timeout_secs: u64,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            device: None,
            serial: None,
            brightness: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_timeout_secs: 0,
        }
    }
}

impl DeckConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deck_driver")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: DeckConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reconnect time limit, `None` for no limit
    pub fn reconnect_timeout(&self) -> Option<Duration> {
        (self.reconnect_timeout_secs > 0).then(|| Duration::from_secs(self.reconnect_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let toml_str = toml::to_string_pretty(&DeckConfig::default()).unwrap();
        assert!(toml_str.contains("reconnect_delay_ms = 500"));
        assert!(!toml_str.contains("device"));
    }

    #[test]
    fn test_roundtrip() {
        let config = DeckConfig {
            device: Some(Model::StreamDeckXL),
            serial: Some("CL12345".to_string()),
            brightness: Some(70),
            reconnect_delay_ms: 250,
            reconnect_timeout_secs: 30,
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("device = \"StreamDeckXL\""));
        let parsed: DeckConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: DeckConfig = toml::from_str("device = \"0x0080\"\n").unwrap();
        assert_eq!(parsed.device, Some(Model::StreamDeckMK2));
        assert_eq!(parsed.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(parsed.reconnect_timeout(), None);
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        assert!(toml::from_str::<DeckConfig>("device = \"Keyboard\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeckConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DeckConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = DeckConfig {
            brightness: Some(30),
            reconnect_timeout_secs: 5,
            ..DeckConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = DeckConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.reconnect_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_huge_reconnect_timeout_is_usable() {
        let config: DeckConfig =
            toml::from_str("reconnect_timeout_secs = 9223372036854775807\n").unwrap();
        let timeout = config.reconnect_timeout().unwrap();
        let token = crate::cancel::CancelToken::new().limited(timeout);
        assert!(!token.is_cancelled());
    }
}
