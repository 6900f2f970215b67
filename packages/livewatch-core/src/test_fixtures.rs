//! Shared test doubles for the admission API, the playback engine, and
//! event observers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::{
    AdmissionApi, ApiError, ApiResult, IssuedToken, QualityCatalog, QualityEntry, StatusPayload,
};
use crate::engine::{EngineError, EngineEvent, EngineEventSink, PlaybackEngine};
use crate::error::SessionError;
use crate::events::{
    AvailabilityEvent, BroadcastEvent, EventEmitter, FailureEvent, SessionEvent,
};
use crate::services::source_selector::StreamSource;
use crate::state::SessionStatus;

// ─────────────────────────────────────────────────────────────────────────────
// Admission API
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted reply of the fake status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReply {
    Online,
    Offline,
    Unauthorized,
    ServerError,
}

/// Builds an active-or-not catalog entry with an absolute URL.
pub fn catalog_entry(name: &str, priority: u32, active: bool) -> QualityEntry {
    QualityEntry {
        name: name.to_string(),
        display_name: Some(name.to_string()),
        description: None,
        application: Some("live".to_string()),
        stream_name: Some(name.to_string()),
        priority,
        url: Some(format!(
            "https://media.example:8443/live/{0}/{0}.m3u8",
            name
        )),
        active,
    }
}

fn default_catalog() -> QualityCatalog {
    QualityCatalog {
        qualities: vec![catalog_entry("source", 1, true), catalog_entry("480p", 2, true)],
        abr: None,
    }
}

/// In-memory admission API with call counters and scripted latency.
pub struct FakeAdmissionApi {
    token_calls: AtomicUsize,
    status_calls: AtomicUsize,
    catalog_calls: AtomicUsize,
    signed_in: AtomicBool,
    token_failing: AtomicBool,
    token_delay: Mutex<Duration>,
    token_ttl: Mutex<Duration>,
    probe_script: Mutex<VecDeque<(Duration, ProbeReply)>>,
    default_probe: Mutex<ProbeReply>,
    catalog: Mutex<Option<QualityCatalog>>,
    last_status_token: Mutex<Option<String>>,
}

impl FakeAdmissionApi {
    pub fn new() -> Self {
        Self {
            token_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            catalog_calls: AtomicUsize::new(0),
            signed_in: AtomicBool::new(true),
            token_failing: AtomicBool::new(false),
            token_delay: Mutex::new(Duration::ZERO),
            token_ttl: Mutex::new(Duration::from_secs(21_600)),
            probe_script: Mutex::new(VecDeque::new()),
            default_probe: Mutex::new(ProbeReply::Online),
            catalog: Mutex::new(Some(default_catalog())),
            last_status_token: Mutex::new(None),
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub fn last_status_token(&self) -> Option<String> {
        self.last_status_token.lock().clone()
    }

    pub fn sign_out(&self) {
        self.signed_in.store(false, Ordering::SeqCst);
    }

    pub fn fail_tokens(&self, failing: bool) {
        self.token_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_token_delay(&self, delay: Duration) {
        *self.token_delay.lock() = delay;
    }

    pub fn set_token_ttl(&self, ttl: Duration) {
        *self.token_ttl.lock() = ttl;
    }

    /// Queues a one-off reply for the next status request.
    pub fn push_probe(&self, delay: Duration, reply: ProbeReply) {
        self.probe_script.lock().push_back((delay, reply));
    }

    /// Reply used once the script is exhausted.
    pub fn set_default_probe(&self, reply: ProbeReply) {
        *self.default_probe.lock() = reply;
    }

    /// `None` makes the catalog endpoint fail.
    pub fn set_catalog(&self, catalog: Option<QualityCatalog>) {
        *self.catalog.lock() = catalog;
    }
}

#[async_trait]
impl AdmissionApi for FakeAdmissionApi {
    async fn issue_stream_token(&self) -> ApiResult<Option<IssuedToken>> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.token_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.token_failing.load(Ordering::SeqCst) {
            return Err(ApiError::HttpStatus(503, "token service down".into()));
        }
        if !self.signed_in.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(IssuedToken {
            stream_token: format!("stream-token-{}", n),
            expires_in: self.token_ttl.lock().as_secs(),
        }))
    }

    async fn stream_status(&self, stream_token: &str) -> ApiResult<StatusPayload> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_status_token.lock() = Some(stream_token.to_string());

        let scripted = self.probe_script.lock().pop_front();
        let (delay, reply) = scripted.unwrap_or((Duration::ZERO, *self.default_probe.lock()));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            ProbeReply::Online => Ok(StatusPayload {
                online: true,
                status: Some("online".into()),
                stream_name: Some("live".into()),
                has_llhls: true,
                total_active_streams: 1,
                ..StatusPayload::default()
            }),
            ProbeReply::Offline => Ok(StatusPayload {
                online: false,
                status: Some("offline".into()),
                ..StatusPayload::default()
            }),
            ProbeReply::Unauthorized => Err(ApiError::Unauthorized(401)),
            ProbeReply::ServerError => Err(ApiError::HttpStatus(500, "boom".into())),
        }
    }

    async fn stream_qualities(&self, _stream_token: &str) -> ApiResult<QualityCatalog> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        self.catalog
            .lock()
            .clone()
            .ok_or_else(|| ApiError::HttpStatus(503, "catalog unavailable".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Engine that replays a scripted event list on every attach.
pub struct ScriptedEngine {
    script: Mutex<Vec<EngineEvent>>,
    sinks: Mutex<Vec<EngineEventSink>>,
    uris: Mutex<Vec<String>>,
    detach_count: AtomicUsize,
    pause_count: AtomicUsize,
    play_count: AtomicUsize,
}

impl ScriptedEngine {
    /// Engine that starts playing on every attach.
    pub fn playing() -> Self {
        Self::with_script(vec![EngineEvent::Ready, EngineEvent::Playing])
    }

    /// Engine that fails on every attach.
    pub fn failing(reason: &str) -> Self {
        Self::with_script(vec![EngineEvent::Error(reason.to_string())])
    }

    pub fn with_script(script: Vec<EngineEvent>) -> Self {
        Self {
            script: Mutex::new(script),
            sinks: Mutex::new(Vec::new()),
            uris: Mutex::new(Vec::new()),
            detach_count: AtomicUsize::new(0),
            pause_count: AtomicUsize::new(0),
            play_count: AtomicUsize::new(0),
        }
    }

    pub fn set_script(&self, script: Vec<EngineEvent>) {
        *self.script.lock() = script;
    }

    pub fn attach_count(&self) -> usize {
        self.uris.lock().len()
    }

    pub fn detach_count(&self) -> usize {
        self.detach_count.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> usize {
        self.pause_count.load(Ordering::SeqCst)
    }

    pub fn play_count(&self) -> usize {
        self.play_count.load(Ordering::SeqCst)
    }

    pub fn last_uri(&self) -> Option<String> {
        self.uris.lock().last().cloned()
    }

    /// Emits through the sink of the `index`-th attachment (0-based).
    pub fn emit_on(&self, index: usize, event: EngineEvent) -> bool {
        self.sinks
            .lock()
            .get(index)
            .map(|sink| sink.emit(event))
            .unwrap_or(false)
    }

    /// Emits through the most recent attachment.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.sinks
            .lock()
            .last()
            .map(|sink| sink.emit(event))
            .unwrap_or(false)
    }
}

impl PlaybackEngine for ScriptedEngine {
    fn attach(&self, source: &StreamSource, events: EngineEventSink) -> Result<(), EngineError> {
        self.uris.lock().push(source.uri.clone());
        for event in self.script.lock().iter().cloned() {
            events.emit(event);
        }
        self.sinks.lock().push(events);
        Ok(())
    }

    fn detach(&self) {
        self.detach_count.fetch_add(1, Ordering::SeqCst);
    }

    fn play(&self) -> Result<(), EngineError> {
        self.play_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observers
// ─────────────────────────────────────────────────────────────────────────────

/// Emitter that records every event.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingEmitter {
    pub fn failures(&self) -> Vec<SessionError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BroadcastEvent::Failure(FailureEvent::Reported { error, .. }) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BroadcastEvent::Session(SessionEvent::StatusChanged { status, .. }) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn retries_scheduled(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, BroadcastEvent::Session(SessionEvent::RetryScheduled { .. })))
            .count()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_session(&self, event: SessionEvent) {
        self.events.lock().push(BroadcastEvent::Session(event));
    }

    fn emit_availability(&self, event: AvailabilityEvent) {
        self.events.lock().push(BroadcastEvent::Availability(event));
    }

    fn emit_failure(&self, event: FailureEvent) {
        self.events.lock().push(BroadcastEvent::Failure(event));
    }
}
