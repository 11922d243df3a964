//! Application configuration schema and loader
//!
//! Configuration is stored as YAML in the patchbay config folder.
//! Default location: ~/.config/patchbay/config.yaml
//!
//! Only the `midi` section belongs to this crate. Any other top-level
//! sections (`mb76` I/O names, `server`, ...) are carried through load/save
//! untouched so a host layer can keep its own settings in the same document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Lowest MIDI channel as presented to users
pub const CHANNEL_MIN: u8 = 1;

/// Highest MIDI channel as presented to users
pub const CHANNEL_MAX: u8 = 16;

/// Root application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// MIDI output settings (the section this crate owns)
    pub midi: MidiSettings,

    /// Sections owned by other layers, preserved verbatim across load/save
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Persisted MIDI output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// MIDI channel, 1-indexed (1-16)
    pub channel: u8,

    /// Selected output device name, if one has been chosen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            channel: CHANNEL_MIN,
            device: None,
        }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/patchbay/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchbay")
        .join("config.yaml")
}

/// Load the configuration from a YAML file
///
/// If the file doesn't exist, returns defaults (channel 1, no device).
/// If the file exists but can't be read or parsed, logs a warning and
/// returns defaults.
pub fn load_config(path: &Path) -> AppConfig {
    if !path.exists() {
        log::info!("load_config: No config at {:?}, using defaults", path);
        return AppConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<AppConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_config: Loaded {:?} (channel {}, device {:?})",
                    path,
                    config.midi.channel,
                    config.midi.device
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}", e);
            AppConfig::default()
        }
    }
}

/// Save the configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Saved {:?}", path);
    Ok(())
}
