pub mod types;

pub use types::*;

use anyhow::Result;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used — allowing the gateway to start with zero configuration for
    /// local development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            GatewayConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            max_in_flight_count = config.max_in_flight_count,
            max_simultaneous_downloads_size = config.max_simultaneous_downloads_size,
            "loaded gateway configuration"
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FETCH_GATEWAY_MAX_IN_FLIGHT") {
            if let Ok(n) = v.parse::<u64>() {
                self.max_in_flight_count = n;
            } else {
                tracing::warn!(value = %v, "ignoring unparsable FETCH_GATEWAY_MAX_IN_FLIGHT");
            }
        }
        if let Ok(v) = std::env::var("FETCH_GATEWAY_MAX_BYTES") {
            match types::parse_byte_size(&v) {
                Ok(n) => self.max_simultaneous_downloads_size = n,
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable FETCH_GATEWAY_MAX_BYTES"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight_count == 0 {
            anyhow::bail!("max_in_flight_count must be at least 1");
        }
        if self.max_simultaneous_downloads_size == 0 {
            anyhow::bail!("max_simultaneous_downloads_size must be at least 1");
        }
        Ok(())
    }
}
