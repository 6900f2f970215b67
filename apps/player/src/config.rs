//! Player configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Player configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Base URL of the admission API.
    /// Override: `LIVEWATCH_API_URL`
    pub api_url: String,

    /// Base URL of the media server.
    /// Override: `LIVEWATCH_MEDIA_URL`
    pub media_url: String,

    /// External player command; `{uri}` is replaced by the playlist URI.
    /// Override: `LIVEWATCH_PLAYER_CMD`
    pub player_command: String,

    /// How long the player process must stay alive before it counts as
    /// playing, in milliseconds.
    /// Override: `LIVEWATCH_STARTUP_GRACE_MS`
    pub startup_grace_ms: u64,

    /// Quality to select once the source list is known.
    pub preferred_quality: Option<String>,

    /// Upper bound on every admission API request, in seconds.
    /// Override: `LIVEWATCH_REQUEST_TIMEOUT`
    pub request_timeout_secs: u64,

    /// Automatic retries before settling offline.
    /// Override: `LIVEWATCH_MAX_RETRIES`
    pub max_retry_attempts: u32,

    /// Delay before an automatic retry, in seconds.
    pub retry_delay_secs: u64,

    /// Minimum spacing between automatic retries, in seconds.
    pub min_retry_interval_secs: u64,

    /// Re-probe interval while playing, in seconds.
    /// Override: `LIVEWATCH_PROBE_INTERVAL`
    pub probe_interval_secs: Option<u64>,

    /// Offer the adaptive playlist first when published.
    pub include_abr: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let core = livewatch_core::Config::default();
        Self {
            api_url: core.api_base_url,
            media_url: core.media_base_url,
            player_command: "ffplay -loglevel error -autoexit {uri}".to_string(),
            startup_grace_ms: 3_000,
            preferred_quality: None,
            request_timeout_secs: core.request_timeout_secs,
            max_retry_attempts: core.max_retry_attempts,
            retry_delay_secs: core.retry_delay_secs,
            min_retry_interval_secs: core.min_retry_interval_secs,
            probe_interval_secs: Some(30),
            include_abr: true,
        }
    }
}

impl PlayerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("LIVEWATCH_API_URL") {
            self.api_url = val;
        }

        if let Some(val) = var("LIVEWATCH_MEDIA_URL") {
            self.media_url = val;
        }

        if let Some(val) = var("LIVEWATCH_PLAYER_CMD") {
            self.player_command = val;
        }

        if let Some(val) = var("LIVEWATCH_STARTUP_GRACE_MS") {
            if let Ok(ms) = val.parse() {
                self.startup_grace_ms = ms;
            }
        }

        if let Some(val) = var("LIVEWATCH_REQUEST_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                self.request_timeout_secs = secs;
            }
        }

        if let Some(val) = var("LIVEWATCH_MAX_RETRIES") {
            if let Ok(attempts) = val.parse() {
                self.max_retry_attempts = attempts;
            }
        }

        if let Some(val) = var("LIVEWATCH_PROBE_INTERVAL") {
            if let Ok(secs) = val.parse::<u64>() {
                self.probe_interval_secs = (secs > 0).then_some(secs);
            }
        }

        // Note: LIVEWATCH_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Startup grace period of the player process.
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Converts to livewatch-core's Config type.
    pub fn to_core_config(&self) -> livewatch_core::Config {
        livewatch_core::Config {
            api_base_url: self.api_url.clone(),
            media_base_url: self.media_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
            max_retry_attempts: self.max_retry_attempts,
            retry_delay_secs: self.retry_delay_secs,
            min_retry_interval_secs: self.min_retry_interval_secs,
            periodic_probe_interval_secs: self.probe_interval_secs,
            include_abr_source: self.include_abr,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = PlayerConfig::from_yaml("api_url: https://api.example\nmax_retry_attempts: 5\n").unwrap();

        assert_eq!(config.api_url, "https://api.example");
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.media_url, PlayerConfig::default().media_url);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = PlayerConfig::default();
        config.apply_env_overrides(|key| match key {
            "LIVEWATCH_MEDIA_URL" => Some("https://media.example".to_string()),
            "LIVEWATCH_PROBE_INTERVAL" => Some("0".to_string()),
            "LIVEWATCH_MAX_RETRIES" => Some("not-a-number".to_string()),
            "LIVEWATCH_STARTUP_GRACE_MS" => Some("750".to_string()),
            _ => None,
        });

        assert_eq!(config.media_url, "https://media.example");
        assert_eq!(config.startup_grace(), Duration::from_millis(750));
        assert_eq!(config.probe_interval_secs, None);
        assert_eq!(config.max_retry_attempts, PlayerConfig::default().max_retry_attempts);
    }

    #[test]
    fn converts_to_valid_core_config() {
        let core = PlayerConfig::default().to_core_config();

        assert!(core.validate().is_ok());
        assert_eq!(core.periodic_probe_interval_secs, Some(30));
        assert!(core.include_abr_source);
    }
}
