//! Playback engine capability interface.
//!
//! The session never renders media itself. Each surface supplies a
//! [`PlaybackEngine`] adapter (HLS.js, a native player, an external process)
//! and the engine reports back through an [`EngineEventSink`]. Events are
//! tagged with the attachment they belong to, so events from a detached
//! source are discarded instead of confusing the state machine.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::services::source_selector::StreamSource;
use crate::utils::redact_token;

/// Errors reported synchronously by engine commands.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not load the source.
    #[error("Failed to attach {uri}: {reason}")]
    Attach {
        /// Redacted URI of the source.
        uri: String,
        /// Engine-specific reason.
        reason: String,
    },

    /// A transport command was issued with nothing attached.
    #[error("Engine is not attached")]
    NotAttached,

    /// A transport command failed.
    #[error("Engine command failed: {0}")]
    Command(String),
}

/// Events an engine reports about the attached source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The source loaded and playback can begin.
    Ready,
    /// Frames are being rendered.
    Playing,
    /// Playback was paused.
    Paused,
    /// The engine started (`true`) or stopped (`false`) buffering.
    Buffering(bool),
    /// Playback failed.
    Error(String),
    /// The stream ended.
    Ended,
}

/// Channel end an engine uses to report events for one attachment.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    attachment: u64,
    tx: mpsc::UnboundedSender<(u64, EngineEvent)>,
}

impl EngineEventSink {
    /// Creates a sink reporting into `tx` for `attachment`.
    ///
    /// The session creates one per attach; engine adapters only need this
    /// to drive themselves in isolation.
    pub fn new(attachment: u64, tx: mpsc::UnboundedSender<(u64, EngineEvent)>) -> Self {
        Self { attachment, tx }
    }

    /// Reports an event. Returns `false` once the session has shut down.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send((self.attachment, event)).is_ok()
    }

    /// Attachment this sink belongs to.
    #[must_use]
    pub fn attachment(&self) -> u64 {
        self.attachment
    }
}

/// A media player the session can drive.
///
/// Commands are synchronous; anything slow happens inside the engine and
/// is reported through the sink handed to [`attach`](Self::attach).
pub trait PlaybackEngine: Send + Sync {
    /// Loads `source` and starts playback, replacing any previous attachment.
    fn attach(&self, source: &StreamSource, events: EngineEventSink) -> Result<(), EngineError>;

    /// Stops playback and releases the source.
    fn detach(&self);

    /// Resumes playback.
    fn play(&self) -> Result<(), EngineError>;

    /// Pauses playback.
    fn pause(&self) -> Result<(), EngineError>;
}

/// Engine that only logs, reporting success for every command.
///
/// Used by headless deployments that exercise the control plane without
/// rendering media.
#[derive(Default)]
pub struct LoggingEngine {
    sink: Mutex<Option<EngineEventSink>>,
}

impl LoggingEngine {
    /// Creates a new logging engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: EngineEvent) -> Result<(), EngineError> {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.emit(event);
                Ok(())
            }
            None => Err(EngineError::NotAttached),
        }
    }
}

impl PlaybackEngine for LoggingEngine {
    fn attach(&self, source: &StreamSource, events: EngineEventSink) -> Result<(), EngineError> {
        log::info!(
            "[LoggingEngine] Attach #{} '{}' -> {}",
            events.attachment(),
            source.label,
            redact_token(&source.uri)
        );
        events.emit(EngineEvent::Ready);
        events.emit(EngineEvent::Playing);
        *self.sink.lock() = Some(events);
        Ok(())
    }

    fn detach(&self) {
        if self.sink.lock().take().is_some() {
            log::info!("[LoggingEngine] Detached");
        }
    }

    fn play(&self) -> Result<(), EngineError> {
        log::info!("[LoggingEngine] Play");
        self.emit(EngineEvent::Playing)
    }

    fn pause(&self) -> Result<(), EngineError> {
        log::info!("[LoggingEngine] Pause");
        self.emit(EngineEvent::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::source_selector::LatencyProfile;

    fn source() -> StreamSource {
        StreamSource {
            label: "Low latency".into(),
            quality: "abr".into(),
            uri: "https://m.example/live/live/abr.m3u8?token=t".into(),
            latency_profile: LatencyProfile::LowLatency,
        }
    }

    #[test]
    fn logging_engine_reports_ready_then_playing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = LoggingEngine::new();

        engine.attach(&source(), EngineEventSink::new(7, tx)).unwrap();

        assert_eq!(rx.try_recv().unwrap(), (7, EngineEvent::Ready));
        assert_eq!(rx.try_recv().unwrap(), (7, EngineEvent::Playing));
    }

    #[test]
    fn commands_fail_when_detached() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = LoggingEngine::new();
        engine.attach(&source(), EngineEventSink::new(1, tx)).unwrap();
        engine.detach();

        assert!(matches!(engine.pause(), Err(EngineError::NotAttached)));
    }

    #[test]
    fn sink_reports_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EngineEventSink::new(1, tx);
        drop(rx);
        assert!(!sink.emit(EngineEvent::Ended));
    }
}
