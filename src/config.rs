use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Probe configuration stored as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Adapter index to open (`hci<N>`).
    #[serde(default)]
    pub adapter: u16,
    /// Reopen the controller after it goes away.
    #[serde(default = "default_true")]
    pub reconnect: bool,
    /// Initial retry delay in seconds.
    #[serde(default = "default_backoff_start")]
    pub backoff_start_secs: u64,
    /// Retry delay cap in seconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_backoff_start() -> u64 {
    2
}

fn default_backoff_max() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            reconnect: true,
            backoff_start_secs: default_backoff_start(),
            backoff_max_secs: default_backoff_max(),
        }
    }
}

impl AppConfig {
    /// Config file path: ~/.config/hcilink/config.toml
    pub fn path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hcilink");
        config_dir.join("config.toml")
    }

    /// Load config from disk, or return defaults.
    pub fn load() -> Self {
        let path = Self::path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Failed to parse config: {}", e),
                },
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
        }
        Self::default()
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        tracing::info!("Config saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_to_sparse_toml() {
        let config: AppConfig = toml::from_str("adapter = 1").unwrap();
        assert_eq!(config.adapter, 1);
        assert!(config.reconnect);
        assert_eq!(config.backoff_start_secs, 2);
        assert_eq!(config.backoff_max_secs, 30);
    }
}
