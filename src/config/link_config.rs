use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DISCONNECT_TIMEOUT_MS, DEFAULT_DISCOVERY_TIMEOUT_MS,
    LinkTimeouts,
};

const CONFIG_FILE_NAME: &str = "link_config.json";

/// Link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long `Connecting` may last before it is abandoned
    pub connect_timeout_ms: u64,
    /// How long `DiscoveringServices` may last before the peer is treated as incompatible
    pub discovery_timeout_ms: u64,
    /// How long to wait for the radio to confirm a disconnect
    pub disconnect_timeout_ms: u64,
    /// Scan results weaker than this are ignored. `None` keeps everything.
    pub min_rssi: Option<i16>,
    /// Default log level; `RUST_LOG` takes precedence
    pub log_level: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            disconnect_timeout_ms: DEFAULT_DISCONNECT_TIMEOUT_MS,
            min_rssi: None,
            log_level: "info".to_string(),
        }
    }
}

impl LinkConfig {
    pub fn timeouts(&self) -> LinkTimeouts {
        LinkTimeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            discovery: Duration::from_millis(self.discovery_timeout_ms),
            disconnect: Duration::from_millis(self.disconnect_timeout_ms),
        }
    }

    /// Loads the config from `config_dir`, falling back to defaults when absent.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!(
                "Link config file not found at {:?}, using default.",
                file_path_str
            );
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Link config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config into `config_dir`.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_config_dir(config_dir).await?;

        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize link config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Link config saved to {:?}", file_path_str);
        Ok(())
    }
}

/// Creates the config directory and its parents when missing
async fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        if let Err(e) = fs::create_dir_all(config_dir).await {
            error!("Failed to create config directory at {:?}: {}", config_dir, e);
            return Err(e.into());
        }
        info!("Created config directory at: {:?}", config_dir);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chippy-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = scratch_dir("missing");
        let config = LinkConfig::load_config(&dir).await.unwrap();
        assert_eq!(config, LinkConfig::default());
    }

    #[tokio::test]
    async fn save_then_load_keeps_settings() {
        let dir = scratch_dir("saved");
        let config = LinkConfig {
            connect_timeout_ms: 2_500,
            min_rssi: Some(-70),
            ..LinkConfig::default()
        };
        config.save_config(&dir).await.unwrap();

        let loaded = LinkConfig::load_config(&dir).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.timeouts().connect, Duration::from_millis(2_500));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn save_creates_nested_config_dir() {
        let root = scratch_dir("nested");
        let dir = root.join("a").join("b");
        LinkConfig::default().save_config(&dir).await.unwrap();
        LinkConfig::default().save_config(&dir).await.unwrap();
        assert!(dir.join(CONFIG_FILE_NAME).is_file());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: LinkConfig = serde_json::from_str(r#"{ "min_rssi": -80 }"#).unwrap();
        assert_eq!(config.min_rssi, Some(-80));
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    }
}
