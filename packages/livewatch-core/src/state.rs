//! Core configuration and session state types.
//!
//! [`Config`] carries every tunable of the controller. [`SessionSnapshot`]
//! is the read-only view of a playback session that surfaces render.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_MIN_RETRY_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TOKEN_RENEWAL_MARGIN_SECS,
};

/// Configuration for a Livewatch playback session.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Endpoints
    /// Base URL of the admission API (token, status, qualities).
    pub api_base_url: String,

    /// Base URL of the media server, used for fallback playlist URIs.
    pub media_base_url: String,

    /// Timeout applied to every admission API request (seconds).
    pub request_timeout_secs: u64,

    // Token lifecycle
    /// Renew a cached stream token this long before it expires (seconds).
    pub token_renewal_margin_secs: u64,

    // Retry policy
    /// Consecutive failed attempts before settling offline.
    pub max_retry_attempts: u32,

    /// Minimum spacing between automatic retries (seconds).
    pub min_retry_interval_secs: u64,

    /// Delay before a scheduled retry fires (seconds).
    pub retry_delay_secs: u64,

    // Availability
    /// Re-probe availability while playing (seconds). `None` disables it.
    pub periodic_probe_interval_secs: Option<u64>,

    // Sources
    /// Offer the catalog's adaptive (ABR) playlist ahead of fixed qualities.
    pub include_abr_source: bool,

    // Channels
    /// Capacity of the session command channel.
    pub command_channel_capacity: usize,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.trim().is_empty() {
            return Err("api_base_url must not be empty".to_string());
        }
        if self.media_base_url.trim().is_empty() {
            return Err("media_base_url must not be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be >= 1".to_string());
        }
        if self.max_retry_attempts == 0 {
            return Err("max_retry_attempts must be >= 1".to_string());
        }
        if self.retry_delay_secs < self.min_retry_interval_secs {
            return Err("retry_delay_secs must be >= min_retry_interval_secs".to_string());
        }
        if self.periodic_probe_interval_secs == Some(0) {
            return Err("periodic_probe_interval_secs must be >= 1 when set".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("command_channel_capacity must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token renewal margin as a [`Duration`].
    #[must_use]
    pub fn token_renewal_margin(&self) -> Duration {
        Duration::from_secs(self.token_renewal_margin_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001".to_string(),
            media_base_url: "https://localhost:8443".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_renewal_margin_secs: DEFAULT_TOKEN_RENEWAL_MARGIN_SECS,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            min_retry_interval_secs: DEFAULT_MIN_RETRY_INTERVAL_SECS,
            retry_delay_secs: DEFAULT_MIN_RETRY_INTERVAL_SECS,
            periodic_probe_interval_secs: None,
            include_abr_source: false,
            command_channel_capacity: 32,
            event_channel_capacity: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session State
// ─────────────────────────────────────────────────────────────────────────────

/// Status of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Not started, or explicitly stopped.
    #[default]
    Idle,
    /// An initialization cycle is in progress or the engine is buffering up.
    Connecting,
    /// The engine is rendering frames.
    Playing,
    /// Playback paused by the user.
    Paused,
    /// A recoverable failure; a retry may be pending.
    Error,
    /// The stream is confirmed down, or the retry budget is spent.
    Offline,
}

impl SessionStatus {
    /// Returns `true` while the engine has (or is about to have) media.
    #[must_use]
    pub fn is_engaged(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Per-attachment playback metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackMetrics {
    /// Milliseconds from the start of the initialization cycle to the first
    /// `playing` event.
    pub startup_latency_ms: Option<u64>,
    /// Number of times playback stalled (buffering while playing).
    pub stall_count: u32,
    /// Number of engine attachments performed by this session.
    pub attach_count: u32,
}

/// Read-only view of a playback session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current status.
    pub status: SessionStatus,
    /// Consecutive failed attempts since the last successful playback.
    pub retry_count: u32,
    /// Latest availability verdict, `None` before the first probe.
    pub stream_online: Option<bool>,
    /// Quality name of the active source.
    pub current_quality: Option<String>,
    /// Qualities that can be passed to a manual quality change.
    pub available_qualities: Vec<String>,
    /// Whether the host is in the foreground.
    pub is_active: bool,
    /// Whether the engine reports it is buffering.
    pub buffering: bool,
    /// Playback metrics.
    pub metrics: PlaybackMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.min_retry_interval_secs, 10);
        assert_eq!(config.token_renewal_margin(), Duration::from_secs(300));
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let config = Config {
            max_retry_attempts: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_delay_shorter_than_min_interval_is_rejected() {
        let config = Config {
            retry_delay_secs: 2,
            min_retry_interval_secs: 10,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            retry_delay_secs: 10,
            min_retry_interval_secs: 10,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_probe_interval_is_rejected() {
        let config = Config {
            periodic_probe_interval_secs: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "https://api.example"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://api.example");
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = SessionSnapshot {
            status: SessionStatus::Playing,
            retry_count: 0,
            stream_online: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "playing");
        assert_eq!(json["streamOnline"], true);
    }
}
