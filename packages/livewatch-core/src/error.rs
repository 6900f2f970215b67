//! Centralized error types for the Livewatch core library.
//!
//! This module provides a unified error handling system that:
//! - Defines the session-level failure taxonomy surfaces render
//! - Gives every collaborator error a machine-readable code
//! - Carries application-wide setup errors

use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;
use crate::engine::EngineError;
use crate::services::source_selector::SelectionError;
use crate::services::token_manager::TokenError;

/// Trait for error types that provide machine-readable error codes.
///
/// Codes are stable across releases so surfaces can key translations and
/// analytics off them.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Unauthorized(_) => "credential_rejected",
            Self::Decode(_) => "response_decode_failed",
            Self::Timeout => "request_timed_out",
        }
    }
}

impl ErrorCode for TokenError {
    fn code(&self) -> &'static str {
        match self {
            Self::AuthUnavailable(_) => "auth_unavailable",
        }
    }
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Attach { .. } => "engine_attach_failed",
            Self::NotAttached => "engine_not_attached",
            Self::Command(_) => "engine_command_failed",
        }
    }
}

impl ErrorCode for SelectionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoSources => "no_sources",
            Self::UnknownQuality(_) => "unknown_quality",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Failure Taxonomy
// ─────────────────────────────────────────────────────────────────────────────

/// Failures of a playback session.
///
/// Every variant except [`SessionError::CancelledByLifecycle`] is surfaced
/// to observers; cancellation is an internal signal only.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "details", rename_all = "camelCase")]
pub enum SessionError {
    /// Token acquisition failed or the stream token was rejected.
    #[error("Authentication unavailable: {0}")]
    AuthUnavailable(String),

    /// The availability probe reported the stream offline (or could not be
    /// completed).
    #[error("Stream offline: {0}")]
    StreamOffline(String),

    /// The playback engine reported an error while the stream was online.
    #[error("Playback engine fault: {0}")]
    EngineFault(String),

    /// The automatic retry budget is spent; only a manual retry or a new
    /// activation restarts the session.
    #[error("Gave up after {attempts} failed attempts")]
    RetryExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
    },

    /// The work was cancelled because the host went inactive or tore down.
    #[error("Cancelled by lifecycle transition")]
    CancelledByLifecycle,

    /// A manual quality change named a quality outside the active set.
    #[error("Quality rejected: {0}")]
    QualityRejected(String),

    /// The session actor is no longer running.
    #[error("Playback session is closed")]
    SessionClosed,
}

impl SessionError {
    /// Returns `true` if the failure should be shown to the user.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::CancelledByLifecycle)
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::AuthUnavailable(_) => "auth_unavailable",
            Self::StreamOffline(_) => "stream_offline",
            Self::EngineFault(_) => "engine_fault",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::CancelledByLifecycle => "cancelled_by_lifecycle",
            Self::QualityRejected(_) => "quality_rejected",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::AuthUnavailable(reason) => Self::AuthUnavailable(reason),
        }
    }
}

impl From<SelectionError> for SessionError {
    fn from(err: SelectionError) -> Self {
        Self::QualityRejected(err.to_string())
    }
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        Self::EngineFault(err.to_string())
    }
}

/// Convenient Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// ─────────────────────────────────────────────────────────────────────────────
// Application Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Application-wide error type for setting up a Livewatch session.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum LivewatchError {
    /// Configuration is invalid (bad URL, zero retry budget, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal setup error (HTTP client construction, ...).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorCode for LivewatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type LivewatchResult<T> = Result<T, LivewatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_user_visible() {
        assert!(!SessionError::CancelledByLifecycle.is_user_visible());
        assert!(SessionError::StreamOffline("down".into()).is_user_visible());
        assert!(SessionError::RetryExhausted { attempts: 3 }.is_user_visible());
    }

    #[test]
    fn token_error_maps_to_auth_unavailable() {
        let err: SessionError = TokenError::AuthUnavailable("timeout".into()).into();
        assert_eq!(err.code(), "auth_unavailable");
    }

    #[test]
    fn unknown_quality_maps_to_quality_rejected() {
        let err: SessionError = SelectionError::UnknownQuality("4k".into()).into();
        assert_eq!(err.code(), "quality_rejected");
        assert!(err.to_string().contains("4k"));
    }

    #[test]
    fn session_error_serializes_with_type_tag() {
        let json = serde_json::to_value(SessionError::RetryExhausted { attempts: 3 }).unwrap();
        assert_eq!(json["type"], "retryExhausted");
        assert_eq!(json["details"]["attempts"], 3);
    }
}
