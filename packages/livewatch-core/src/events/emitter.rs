//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, so a surface can plug in its own delivery (UI bindings, analytics).

use super::{AvailabilityEvent, FailureEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a session state machine event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits an availability verdict change.
    fn emit_availability(&self, event: AvailabilityEvent);

    /// Emits a user-visible failure.
    fn emit_failure(&self, event: FailureEvent);
}

/// No-op emitter for embedding without observers, and for tests.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_availability(&self, _event: AvailabilityEvent) {}

    fn emit_failure(&self, _event: FailureEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_availability(&self, event: AvailabilityEvent) {
        tracing::debug!(?event, "availability_event");
    }

    fn emit_failure(&self, event: FailureEvent) {
        tracing::debug!(?event, "failure_event");
    }
}
