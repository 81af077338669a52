use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the compression console client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the transcoding worker service
    pub server_url: String,
    /// Interval in seconds between reconciliation polls
    pub poll_interval_secs: u64,
    /// Timeout in seconds applied to every HTTP request
    pub request_timeout_secs: u64,
    /// Delay in milliseconds before the loading indicator becomes visible
    pub activity_threshold_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ClientConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_secs: 5,
            request_timeout_secs: 30,
            activity_threshold_ms: 200,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // Try JSON first, then TOML
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    let file_config: ClientConfig = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                    config = file_config;
                } else {
                    let file_config: ClientConfig = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                    config = file_config;
                }
            }
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn activity_threshold(&self) -> Duration {
        Duration::from_millis(self.activity_threshold_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_path_given() {
        let cfg = ClientConfig::load_config(None).unwrap();
        assert_eq!(cfg.server_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.poll_interval_secs, 5);
        assert_eq!(cfg.activity_threshold_ms, 200);
    }

    #[test]
    fn defaults_when_file_missing() {
        let path = std::env::temp_dir().join("vcc-config-does-not-exist.json");
        let cfg = ClientConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.poll_interval_secs, ClientConfig::default_config().poll_interval_secs);
    }

    #[test]
    fn loads_json_file() {
        let path = std::env::temp_dir().join(format!("vcc-config-{}.json", std::process::id()));
        let mut cfg = ClientConfig::default_config();
        cfg.server_url = "http://worker:5000".to_string();
        cfg.poll_interval_secs = 2;
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();

        let loaded = ClientConfig::load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.server_url, "http://worker:5000");
        assert_eq!(loaded.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn loads_toml_file() {
        let path = std::env::temp_dir().join(format!("vcc-config-{}.toml", std::process::id()));
        let content = r#"
server_url = "http://worker:5000"
poll_interval_secs = 7
request_timeout_secs = 10
activity_threshold_ms = 150
"#;
        std::fs::write(&path, content).unwrap();

        let loaded = ClientConfig::load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.poll_interval_secs, 7);
        assert_eq!(loaded.activity_threshold(), Duration::from_millis(150));
    }
}
