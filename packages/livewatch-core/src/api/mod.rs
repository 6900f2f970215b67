//! Admission API collaborator.
//!
//! The admission API sits in front of the media server and exposes three
//! JSON endpoints: stream token issuance, availability status, and the
//! quality catalog. [`AdmissionApi`] abstracts them so services can be
//! tested against fakes; [`HttpAdmissionApi`] is the production client.

mod http;

pub use http::HttpAdmissionApi;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur when talking to the admission API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection refused, DNS, TLS, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status other than 401/403.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Server rejected the presented credential or token (401/403).
    #[error("Credential rejected (HTTP {0})")]
    Unauthorized(u16),

    /// Response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,
}

/// Convenient Result alias for admission API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Returns true if the server rejected the presented credential.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Returns true if the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Token issuance response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// Opaque stream token.
    pub stream_token: String,
    /// Lifetime of the token in seconds.
    pub expires_in: u64,
}

/// Availability status response.
///
/// Only `online` is required; the rest is diagnostic.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Whether the stream is currently live.
    #[serde(default)]
    pub online: bool,
    /// Media server state string ("online", "offline", ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Name of the stream being probed.
    #[serde(default)]
    pub stream_name: Option<String>,
    /// Whether a WebRTC output is published.
    #[serde(default, rename = "hasWebRTC")]
    pub has_webrtc: bool,
    /// Whether an LLHLS output is published.
    #[serde(default, rename = "hasLLHLS")]
    pub has_llhls: bool,
    /// Number of streams currently published on the media server.
    #[serde(default)]
    pub total_active_streams: u32,
    /// Error reported by the admission API while asking the media server.
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry of the quality catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualityEntry {
    /// Machine name used to select the quality ("source", "720p", ...).
    pub name: String,
    /// Human-readable label.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Media server application publishing this quality.
    #[serde(default)]
    pub application: Option<String>,
    /// Stream name under the application.
    #[serde(default)]
    pub stream_name: Option<String>,
    /// Ordering hint; lower is preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Playlist URL, absolute or relative to the media base.
    #[serde(default)]
    pub url: Option<String>,
    /// Whether the quality is currently published.
    #[serde(default)]
    pub active: bool,
}

fn default_priority() -> u32 {
    u32::MAX
}

/// Adaptive bitrate entry of the quality catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AbrEntry {
    /// Whether the ABR playlist is currently published.
    #[serde(default)]
    pub active: bool,
    /// ABR playlist URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Quality catalog response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualityCatalog {
    /// All known qualities, active or not.
    #[serde(default)]
    pub qualities: Vec<QualityEntry>,
    /// Adaptive bitrate playlist, if the server publishes one.
    #[serde(default)]
    pub abr: Option<AbrEntry>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Admission API operations.
///
/// Implementations must not retry on their own; retry policy belongs to
/// the session.
#[async_trait]
pub trait AdmissionApi: Send + Sync {
    /// Exchanges the user credential for a stream token.
    ///
    /// Returns `Ok(None)` when there is no authenticated user session.
    async fn issue_stream_token(&self) -> ApiResult<Option<IssuedToken>>;

    /// Asks whether the stream is live, presenting the stream token.
    async fn stream_status(&self, stream_token: &str) -> ApiResult<StatusPayload>;

    /// Fetches the quality catalog, presenting the stream token.
    async fn stream_qualities(&self, stream_token: &str) -> ApiResult<QualityCatalog>;
}

/// Source of the user's bearer credential.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current credential, or `None` when signed out.
    fn bearer(&self) -> Option<String>;
}

/// In-memory credential store.
///
/// Hosts update it on sign-in and sign-out.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    /// Creates a store holding `token`.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.is_empty())),
        }
    }

    /// Replaces the stored credential.
    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.is_empty());
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer(&self) -> Option<String> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_payload_decodes_server_shape() {
        let json = r#"{
            "online": true,
            "status": "online",
            "streamName": "live",
            "hasWebRTC": true,
            "hasLLHLS": true,
            "totalActiveStreams": 2,
            "streamDetails": {"ignored": true},
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let payload: StatusPayload = serde_json::from_str(json).unwrap();
        assert!(payload.online);
        assert!(payload.has_webrtc);
        assert!(payload.has_llhls);
        assert_eq!(payload.total_active_streams, 2);
    }

    #[test]
    fn status_payload_defaults_to_offline() {
        let payload: StatusPayload = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert!(!payload.online);
        assert_eq!(payload.error.as_deref(), Some("boom"));
    }

    #[test]
    fn catalog_decodes_with_missing_optionals() {
        let json = r#"{
            "qualities": [
                {"name": "source", "displayName": "Source", "priority": 1, "active": true,
                 "url": "https://m.example/live/live/live.m3u8"},
                {"name": "480p", "active": false}
            ],
            "abr": {"active": true, "url": "https://m.example/live/live/abr.m3u8"},
            "totalQualities": 2,
            "activeQualities": 1
        }"#;
        let catalog: QualityCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.qualities.len(), 2);
        assert_eq!(catalog.qualities[1].priority, u32::MAX);
        assert!(catalog.abr.unwrap().active);
    }

    #[test]
    fn empty_credential_counts_as_signed_out() {
        let creds = StaticCredentials::new(Some(String::new()));
        assert!(creds.bearer().is_none());
        creds.set(Some("jwt".into()));
        assert_eq!(creds.bearer().as_deref(), Some("jwt"));
    }
}
