//! Event system for session observers.
//!
//! This module provides:
//! - [`EventEmitter`] trait for services to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for session status, availability, and failures
//!
//! Snapshots ([`SessionSnapshot`](crate::state::SessionSnapshot)) answer
//! "what is the state now"; events answer "what just happened".

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::error::SessionError;
use crate::state::SessionStatus;

/// Events broadcast to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Session status and source changes.
    Session(SessionEvent),

    /// Availability probe verdicts.
    Availability(AvailabilityEvent),

    /// User-visible failures.
    Failure(FailureEvent),
}

/// Events related to the playback session state machine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session moved to a new status.
    StatusChanged {
        /// Status before the transition.
        previous: SessionStatus,
        /// Status after the transition.
        status: SessionStatus,
        /// Consecutive failed attempts at the time of the transition.
        #[serde(rename = "retryCount")]
        retry_count: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An automatic retry was scheduled.
    RetryScheduled {
        /// Attempt number (1-based).
        attempt: u32,
        /// Attempt budget before settling offline.
        #[serde(rename = "maxAttempts")]
        max_attempts: u32,
        /// Delay until the retry fires.
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A different source was attached to the engine.
    SourceChanged {
        /// Quality name of the new source.
        quality: String,
        /// Display label of the new source.
        label: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to stream availability.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AvailabilityEvent {
    /// The online/offline verdict changed.
    Changed {
        /// Whether the stream is live.
        online: bool,
        /// Human-readable reason when offline.
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events carrying user-visible failures.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FailureEvent {
    /// A failure was recorded by the session.
    Reported {
        /// Machine-readable failure code.
        code: &'static str,
        /// The failure itself.
        error: SessionError,
        /// Consecutive failed attempts including this one.
        #[serde(rename = "retryCount")]
        retry_count: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}
