//! Playback session state machine.
//!
//! Responsibilities:
//! - Drive initialization cycles (token → probe → sources → engine attach)
//! - Bounded, rate-limited automatic retries
//! - Distinguish "stream is offline" from "playback failed"
//! - Manual retry, quality changes, and play/pause
//! - Suspend on host deactivation and revalidate on reactivation
//!
//! The session is an actor. [`PlaybackSession`] is a cheap handle that sends
//! commands; the actor owns all mutable state and publishes a
//! [`SessionSnapshot`] through a watch channel after every step.
//!
//! Network work runs in spawned cycles. Each cycle carries an epoch and a
//! cancellation token; launching a new cycle or deactivating cancels the
//! current one, and any result whose epoch is no longer current is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineEvent, EngineEventSink, PlaybackEngine};
use crate::error::{ErrorCode, SessionError, SessionResult};
use crate::events::{AvailabilityEvent, EventEmitter, FailureEvent, SessionEvent};
use crate::lifecycle::LifecycleHooks;
use crate::runtime::{TaskSpawner, TaskSpawnerExt};
use crate::services::availability::{AvailabilityMonitor, AvailabilityResult};
use crate::services::source_selector::{SourceCriterion, SourceSelector, SourceSet, StreamSource};
use crate::services::token_manager::{StreamToken, TokenError, TokenManager};
use crate::state::{Config, PlaybackMetrics, SessionSnapshot, SessionStatus};
use crate::utils::{now_millis, redact_token};

// ─────────────────────────────────────────────────────────────────────────────
// Policy & Dependencies
// ─────────────────────────────────────────────────────────────────────────────

/// Retry and probing policy of a session.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Consecutive failed attempts before settling offline.
    pub max_retry_attempts: u32,
    /// Minimum spacing between two automatic retries.
    pub min_retry_interval: Duration,
    /// Delay before a scheduled retry fires.
    pub retry_delay: Duration,
    /// Re-probe interval while playing, `None` to disable.
    pub periodic_probe_interval: Option<Duration>,
}

impl SessionPolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            min_retry_interval: Duration::from_secs(config.min_retry_interval_secs),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            periodic_probe_interval: config.periodic_probe_interval_secs.map(Duration::from_secs),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators of a session.
pub struct SessionDeps {
    /// Stream token cache.
    pub tokens: Arc<TokenManager>,
    /// Availability prober.
    pub availability: Arc<AvailabilityMonitor>,
    /// Source resolver.
    pub selector: Arc<SourceSelector>,
    /// Platform playback engine.
    pub engine: Arc<dyn PlaybackEngine>,
    /// Event sink for observers.
    pub emitter: Arc<dyn EventEmitter>,
    /// Spawner for the actor and its cycles.
    pub spawner: Arc<dyn TaskSpawner>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

enum SessionCommand {
    Start,
    Stop,
    ManualRetry,
    ChangeQuality {
        name: String,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    TogglePlayPause,
    SetActive(bool),
}

/// Handle to a running playback session.
///
/// Cloning the handle is cheap; all clones address the same session. The
/// session stops when [`shutdown`](Self::shutdown) is called or every handle
/// is dropped.
#[derive(Clone)]
pub struct PlaybackSession {
    commands: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
}

impl PlaybackSession {
    /// Spawns the session actor.
    ///
    /// # Arguments
    /// * `deps` - Collaborators
    /// * `policy` - Retry and probing policy
    /// * `command_capacity` - Capacity of the command channel
    /// * `shutdown` - Cancelling this token tears the session down
    pub fn spawn(
        deps: SessionDeps,
        policy: SessionPolicy,
        command_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(command_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            is_active: true,
            ..SessionSnapshot::default()
        });
        let (cycle_tx, cycle_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let probe_rx = deps.availability.subscribe();
        let spawner = Arc::clone(&deps.spawner);

        let actor = SessionActor::new(deps, policy, snapshot_tx, cycle_tx, engine_tx);
        spawner.spawn(actor.run(
            Channels {
                commands: command_rx,
                cycles: cycle_rx,
                engine: engine_rx,
                probes: probe_rx,
            },
            shutdown.clone(),
        ));

        Self {
            commands: command_tx,
            snapshot_rx,
            shutdown,
        }
    }

    async fn send(&self, command: SessionCommand) -> SessionResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Starts playback (token → probe → sources → attach).
    ///
    /// Restarts the initialization cycle if one is already running.
    pub async fn start(&self) -> SessionResult<()> {
        self.send(SessionCommand::Start).await
    }

    /// Stops playback and returns to idle.
    pub async fn stop(&self) -> SessionResult<()> {
        self.send(SessionCommand::Stop).await
    }

    /// Resets the retry budget and starts a fresh initialization cycle.
    pub async fn manual_retry(&self) -> SessionResult<()> {
        self.send(SessionCommand::ManualRetry).await
    }

    /// Switches to the named quality.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::QualityRejected`] if the quality is not in the
    /// current active set; the session is left unchanged.
    pub async fn change_quality(&self, name: impl Into<String>) -> SessionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ChangeQuality {
            name: name.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Pauses when playing, resumes when paused.
    pub async fn toggle_play_pause(&self) -> SessionResult<()> {
        self.send(SessionCommand::TogglePlayPause).await
    }

    /// Tells the session whether the host is in the foreground.
    pub async fn set_active(&self, active: bool) -> SessionResult<()> {
        self.send(SessionCommand::SetActive(active)).await
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribes to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Tears the session down: cancels all work and detaches the engine.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns `true` once the actor has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[async_trait]
impl LifecycleHooks for PlaybackSession {
    async fn on_activate(&self) {
        if let Err(e) = self.set_active(true).await {
            log::debug!("[Session] Activation ignored: {}", e);
        }
    }

    async fn on_deactivate(&self) {
        if let Err(e) = self.set_active(false).await {
            log::debug!("[Session] Deactivation ignored: {}", e);
        }
    }

    async fn on_teardown(&self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycles
// ─────────────────────────────────────────────────────────────────────────────

enum CycleKind {
    /// Full initialization ending in an engine attach.
    Initialize { force_refresh: bool },
    /// Token and availability check after reactivation.
    Revalidate,
    /// Availability check after an engine failure.
    EngineCheck { token: String, reason: String },
}

impl CycleKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Revalidate => "revalidate",
            Self::EngineCheck { .. } => "engine-check",
        }
    }
}

enum CycleOutcome {
    Cancelled,
    NoUserSession,
    TokenFailed(TokenError),
    TokenRejected,
    Offline(AvailabilityResult),
    Ready {
        token: StreamToken,
        availability: AvailabilityResult,
        sources: Vec<StreamSource>,
    },
    Revalidated {
        token: Option<StreamToken>,
        availability: Option<AvailabilityResult>,
    },
    EngineChecked {
        availability: AvailabilityResult,
        reason: String,
    },
}

struct CycleReport {
    epoch: u64,
    outcome: CycleOutcome,
}

/// What a spawned cycle needs, plus its cancellation token.
struct CycleContext {
    tokens: Arc<TokenManager>,
    availability: Arc<AvailabilityMonitor>,
    selector: Arc<SourceSelector>,
    cancel: CancellationToken,
}

impl CycleContext {
    /// Runs one suspension point, yielding `None` if the cycle is cancelled.
    async fn step<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = future => Some(output),
        }
    }

    async fn probe(&self, token: &str) -> Option<AvailabilityResult> {
        self.step(self.availability.probe(token)).await.flatten()
    }

    async fn run(self, kind: CycleKind) -> CycleOutcome {
        match kind {
            CycleKind::Initialize { force_refresh } => self.initialize(force_refresh).await,
            CycleKind::Revalidate => self.revalidate().await,
            CycleKind::EngineCheck { token, reason } => match self.probe(&token).await {
                Some(availability) => CycleOutcome::EngineChecked {
                    availability,
                    reason,
                },
                None => CycleOutcome::Cancelled,
            },
        }
    }

    async fn initialize(&self, force_refresh: bool) -> CycleOutcome {
        let token = match self.step(self.tokens.acquire(force_refresh)).await {
            None => return CycleOutcome::Cancelled,
            Some(Ok(Some(token))) => token,
            Some(Ok(None)) => return CycleOutcome::NoUserSession,
            Some(Err(e)) => return CycleOutcome::TokenFailed(e),
        };

        let Some(availability) = self.probe(token.value()).await else {
            return CycleOutcome::Cancelled;
        };
        if availability.token_rejected {
            return CycleOutcome::TokenRejected;
        }
        if !availability.online {
            return CycleOutcome::Offline(availability);
        }

        let Some(sources) = self.step(self.selector.resolve_sources(token.value())).await else {
            return CycleOutcome::Cancelled;
        };

        CycleOutcome::Ready {
            token,
            availability,
            sources,
        }
    }

    async fn revalidate(&self) -> CycleOutcome {
        let mut token = match self.step(self.tokens.acquire(false)).await {
            None => return CycleOutcome::Cancelled,
            Some(Ok(Some(token))) => token,
            Some(Ok(None)) | Some(Err(_)) => {
                return CycleOutcome::Revalidated {
                    token: None,
                    availability: None,
                }
            }
        };

        let Some(mut availability) = self.probe(token.value()).await else {
            return CycleOutcome::Cancelled;
        };

        if availability.token_rejected {
            log::info!("[Session] Token rejected after reactivation, renewing");
            self.tokens.invalidate();
            token = match self.step(self.tokens.acquire(true)).await {
                None => return CycleOutcome::Cancelled,
                Some(Ok(Some(token))) => token,
                Some(Ok(None)) | Some(Err(_)) => {
                    return CycleOutcome::Revalidated {
                        token: None,
                        availability: None,
                    }
                }
            };
            availability = match self.probe(token.value()).await {
                Some(availability) => availability,
                None => return CycleOutcome::Cancelled,
            };
        }

        CycleOutcome::Revalidated {
            token: Some(token),
            availability: Some(availability),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct Channels {
    commands: mpsc::Receiver<SessionCommand>,
    cycles: mpsc::UnboundedReceiver<CycleReport>,
    engine: mpsc::UnboundedReceiver<(u64, EngineEvent)>,
    probes: watch::Receiver<Option<AvailabilityResult>>,
}

struct SessionActor {
    deps: SessionDeps,
    policy: SessionPolicy,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cycle_tx: mpsc::UnboundedSender<CycleReport>,
    engine_tx: mpsc::UnboundedSender<(u64, EngineEvent)>,

    status: SessionStatus,
    retry_count: u32,
    /// When the most recently scheduled automatic retry fires.
    last_retry_at: Option<Instant>,
    /// When the pending automatic retry fires.
    retry_at: Option<Instant>,
    is_active: bool,
    /// Playback was requested and not stopped since.
    started: bool,

    token: Option<StreamToken>,
    force_token_refresh: bool,
    sources: Option<SourceSet>,
    preferred_quality: Option<String>,
    stream_online: Option<bool>,
    buffering: bool,
    metrics: PlaybackMetrics,
    cycle_started_at: Option<Instant>,

    epoch: u64,
    cycle_cancel: Option<CancellationToken>,
    attachment: u64,
    attached: bool,
}

impl SessionActor {
    fn new(
        deps: SessionDeps,
        policy: SessionPolicy,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        cycle_tx: mpsc::UnboundedSender<CycleReport>,
        engine_tx: mpsc::UnboundedSender<(u64, EngineEvent)>,
    ) -> Self {
        Self {
            deps,
            policy,
            snapshot_tx,
            cycle_tx,
            engine_tx,
            status: SessionStatus::Idle,
            retry_count: 0,
            last_retry_at: None,
            retry_at: None,
            is_active: true,
            started: false,
            token: None,
            force_token_refresh: false,
            sources: None,
            preferred_quality: None,
            stream_online: None,
            buffering: false,
            metrics: PlaybackMetrics::default(),
            cycle_started_at: None,
            epoch: 0,
            cycle_cancel: None,
            attachment: 0,
            attached: false,
        }
    }

    async fn run(mut self, mut channels: Channels, shutdown: CancellationToken) {
        log::info!("[Session] Actor started");

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    log::info!("[Session] Shutting down");
                    self.teardown();
                    break;
                }
                command = channels.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        log::info!("[Session] All handles dropped, shutting down");
                        self.teardown();
                        break;
                    }
                },
                Some(report) = channels.cycles.recv() => self.handle_cycle_report(report),
                Some((attachment, event)) = channels.engine.recv() => {
                    self.handle_engine_event(attachment, event);
                }
                Ok(()) = channels.probes.changed() => {
                    let latest = channels.probes.borrow_and_update().clone();
                    self.observe_probe(latest);
                }
                _ = retry_timer(retry_at) => self.fire_retry(),
            }

            self.publish();
        }

        self.publish();
        log::info!("[Session] Actor stopped");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start(),
            SessionCommand::Stop => self.stop(),
            SessionCommand::ManualRetry => self.manual_retry(),
            SessionCommand::ChangeQuality { name, reply } => {
                let result = self.change_quality(name);
                let _ = reply.send(result);
            }
            SessionCommand::TogglePlayPause => self.toggle_play_pause(),
            SessionCommand::SetActive(true) => self.activate(),
            SessionCommand::SetActive(false) => self.deactivate(),
        }
    }

    fn start(&mut self) {
        self.started = true;
        if !self.is_active {
            log::info!("[Session] Start requested while inactive, deferring to activation");
            return;
        }
        self.begin_initialization();
    }

    fn stop(&mut self) {
        self.started = false;
        self.cancel_cycle();
        self.retry_at = None;
        self.deps.availability.stop();
        self.detach_engine();
        self.sources = None;
        self.set_status(SessionStatus::Idle);
    }

    fn teardown(&mut self) {
        self.stop();
        self.is_active = false;
    }

    fn manual_retry(&mut self) {
        log::info!("[Session] Manual retry requested");
        self.retry_count = 0;
        self.last_retry_at = None;
        self.retry_at = None;
        self.started = true;
        if !self.is_active {
            log::info!("[Session] Inactive, retry deferred to activation");
            return;
        }
        self.begin_initialization();
    }

    fn change_quality(&mut self, name: String) -> SessionResult<()> {
        let Some(sources) = self.sources.as_mut() else {
            return Err(SessionError::QualityRejected(format!(
                "no active source set, cannot select '{}'",
                name
            )));
        };
        let source = sources.select(&SourceCriterion::Quality(name.clone()))?.clone();

        log::info!("[Session] Quality changed to '{}'", name);
        self.preferred_quality = Some(name);

        if self.attached {
            self.detach_engine();
            self.cycle_started_at = Some(Instant::now());
            self.set_status(SessionStatus::Connecting);
            self.attach(source);
        }
        Ok(())
    }

    fn toggle_play_pause(&mut self) {
        match self.status {
            SessionStatus::Playing => match self.deps.engine.pause() {
                Ok(()) => self.set_status(SessionStatus::Paused),
                Err(e) => log::warn!("[Session] Pause failed: {}", e),
            },
            SessionStatus::Paused => match self.deps.engine.play() {
                Ok(()) => self.set_status(SessionStatus::Playing),
                Err(e) => log::warn!("[Session] Resume failed: {}", e),
            },
            other => log::debug!("[Session] Play/pause ignored while {:?}", other),
        }
    }

    fn activate(&mut self) {
        if self.is_active {
            return;
        }
        self.is_active = true;
        if !self.started {
            return;
        }
        log::info!("[Session] Reactivated, revalidating token and availability");
        self.launch(CycleKind::Revalidate);
    }

    fn deactivate(&mut self) {
        if !self.is_active {
            return;
        }
        self.is_active = false;
        if self.cycle_cancel.is_some() {
            log::debug!("[Session] {}", SessionError::CancelledByLifecycle);
        }
        self.cancel_cycle();
        if self.retry_at.take().is_some() {
            // The dropped retry never fired, so it does not count for spacing.
            self.last_retry_at = None;
            log::info!("[Session] Pending retry dropped on deactivation");
        }
        self.deps.availability.stop();
        log::info!("[Session] Deactivated ({:?})", self.status);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cycles
    // ─────────────────────────────────────────────────────────────────────────

    fn begin_initialization(&mut self) {
        self.retry_at = None;
        self.detach_engine();
        self.deps.availability.stop_periodic();
        self.sources = None;
        self.cycle_started_at = Some(Instant::now());
        self.set_status(SessionStatus::Connecting);
        let force_refresh = std::mem::take(&mut self.force_token_refresh);
        self.launch(CycleKind::Initialize { force_refresh });
    }

    fn launch(&mut self, kind: CycleKind) {
        self.cancel_cycle();
        let epoch = self.epoch;
        let cancel = CancellationToken::new();
        self.cycle_cancel = Some(cancel.clone());

        log::debug!("[Session] Launching {} cycle #{}", kind.name(), epoch);

        let context = CycleContext {
            tokens: Arc::clone(&self.deps.tokens),
            availability: Arc::clone(&self.deps.availability),
            selector: Arc::clone(&self.deps.selector),
            cancel,
        };
        let reports = self.cycle_tx.clone();
        self.deps.spawner.spawn(async move {
            let outcome = context.run(kind).await;
            let _ = reports.send(CycleReport { epoch, outcome });
        });
    }

    /// Cancels the running cycle and retires its epoch.
    fn cancel_cycle(&mut self) {
        if let Some(cancel) = self.cycle_cancel.take() {
            cancel.cancel();
        }
        self.epoch += 1;
    }

    fn handle_cycle_report(&mut self, report: CycleReport) {
        if report.epoch != self.epoch {
            log::debug!("[Session] Discarding result of superseded cycle #{}", report.epoch);
            return;
        }
        self.cycle_cancel = None;

        match report.outcome {
            CycleOutcome::Cancelled => {
                log::debug!("[Session] Cycle #{} cancelled", report.epoch);
            }
            CycleOutcome::NoUserSession => {
                self.fail(SessionError::AuthUnavailable(
                    "no authenticated user session".to_string(),
                ));
            }
            CycleOutcome::TokenFailed(e) => self.fail(e.into()),
            CycleOutcome::TokenRejected => self.handle_token_rejection(),
            CycleOutcome::Offline(availability) => {
                self.record_availability(&availability);
                self.go_offline(SessionError::StreamOffline(offline_detail(&availability)));
            }
            CycleOutcome::Ready {
                token,
                availability,
                sources,
            } => {
                self.record_availability(&availability);
                self.token = Some(token);
                self.attach_sources(sources);
            }
            CycleOutcome::Revalidated {
                token,
                availability,
            } => self.finish_revalidation(token, availability),
            CycleOutcome::EngineChecked {
                availability,
                reason,
            } => {
                if availability.token_rejected {
                    self.handle_token_rejection();
                } else if availability.online {
                    self.record_availability(&availability);
                    self.fail(SessionError::EngineFault(reason));
                } else {
                    self.record_availability(&availability);
                    self.go_offline(SessionError::StreamOffline(offline_detail(&availability)));
                }
            }
        }
    }

    fn finish_revalidation(
        &mut self,
        token: Option<StreamToken>,
        availability: Option<AvailabilityResult>,
    ) {
        let (Some(token), Some(availability)) = (token, availability) else {
            log::info!("[Session] Revalidation found no usable token, reinitializing");
            self.begin_initialization();
            return;
        };

        if availability.token_rejected {
            self.handle_token_rejection();
            return;
        }

        self.record_availability(&availability);
        self.token = Some(token);

        if !availability.online {
            self.go_offline(SessionError::StreamOffline(offline_detail(&availability)));
        } else if self.attached && self.status.is_engaged() {
            log::info!("[Session] Stream still live, resuming {:?}", self.status);
            self.start_periodic_probing();
        } else {
            self.begin_initialization();
        }
    }

    fn attach_sources(&mut self, sources: Vec<StreamSource>) {
        let mut set = SourceSet::new(sources);
        let criterion = match &self.preferred_quality {
            Some(quality) if set.qualities().contains(quality) => {
                SourceCriterion::Quality(quality.clone())
            }
            _ => SourceCriterion::Default,
        };

        let source = match set.select(&criterion) {
            Ok(source) => source.clone(),
            Err(e) => {
                self.fail(SessionError::EngineFault(e.to_string()));
                return;
            }
        };

        self.sources = Some(set);
        self.attach(source);
    }

    fn attach(&mut self, source: StreamSource) {
        self.attachment += 1;
        let sink = EngineEventSink::new(self.attachment, self.engine_tx.clone());

        log::info!(
            "[Session] Attaching '{}' ({:?}) -> {}",
            source.label,
            source.latency_profile,
            redact_token(&source.uri)
        );
        self.metrics.attach_count += 1;
        self.deps.emitter.emit_session(SessionEvent::SourceChanged {
            quality: source.quality.clone(),
            label: source.label.clone(),
            timestamp: now_millis(),
        });

        match self.deps.engine.attach(&source, sink) {
            Ok(()) => self.attached = true,
            Err(e) => {
                self.attached = false;
                self.fail(e.into());
            }
        }
    }

    fn detach_engine(&mut self) {
        if self.attached {
            self.deps.engine.detach();
            self.attached = false;
        }
        // Retire the attachment so late events from it are ignored.
        self.attachment += 1;
        self.buffering = false;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Failures & Retries
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_token_rejection(&mut self) {
        self.deps.tokens.invalidate();
        self.token = None;
        self.force_token_refresh = true;
        self.fail(SessionError::AuthUnavailable(
            "stream token rejected".to_string(),
        ));
    }

    fn fail(&mut self, error: SessionError) {
        self.detach_engine();
        self.deps.availability.stop_periodic();
        self.sources = None;
        self.set_status(SessionStatus::Error);
        self.report(&error);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if self.retry_at.is_some() {
            log::debug!("[Session] Retry already pending, failure absorbed");
            return;
        }
        if !self.is_active {
            log::info!("[Session] Inactive, recovery deferred to activation");
            return;
        }

        let now = Instant::now();
        self.retry_count += 1;
        if self.retry_count >= self.policy.max_retry_attempts {
            log::warn!(
                "[Session] Retry budget exhausted after {} attempts",
                self.retry_count
            );
            self.go_offline(SessionError::RetryExhausted {
                attempts: self.retry_count,
            });
            return;
        }

        // Retries never fire closer together than the minimum interval.
        let mut fire_at = now + self.policy.retry_delay;
        if let Some(last) = self.last_retry_at {
            fire_at = fire_at.max(last + self.policy.min_retry_interval);
        }
        let delay = fire_at.saturating_duration_since(now);

        self.last_retry_at = Some(fire_at);
        self.retry_at = Some(fire_at);
        log::info!(
            "[Session] Retry {}/{} in {:?}",
            self.retry_count,
            self.policy.max_retry_attempts,
            delay
        );
        self.deps.emitter.emit_session(SessionEvent::RetryScheduled {
            attempt: self.retry_count,
            max_attempts: self.policy.max_retry_attempts,
            delay_ms: delay.as_millis() as u64,
            timestamp: now_millis(),
        });
    }

    fn fire_retry(&mut self) {
        self.retry_at = None;
        if !self.is_active || !self.started {
            return;
        }
        log::info!("[Session] Retry {} firing", self.retry_count);
        self.begin_initialization();
    }

    fn go_offline(&mut self, error: SessionError) {
        self.retry_at = None;
        self.detach_engine();
        self.deps.availability.stop_periodic();
        self.sources = None;
        self.set_status(SessionStatus::Offline);
        self.report(&error);
    }

    fn report(&self, error: &SessionError) {
        if !error.is_user_visible() {
            log::debug!("[Session] {}", error);
            return;
        }
        log::warn!("[Session] {} ({})", error, error.code());
        self.deps.emitter.emit_failure(FailureEvent::Reported {
            code: error.code(),
            error: error.clone(),
            retry_count: self.retry_count,
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Engine Events
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_engine_event(&mut self, attachment: u64, event: EngineEvent) {
        if !self.attached || attachment != self.attachment {
            log::trace!(
                "[Session] Ignoring {:?} from retired attachment #{}",
                event,
                attachment
            );
            return;
        }

        match event {
            EngineEvent::Ready => log::debug!("[Session] Engine ready"),
            EngineEvent::Playing => self.on_playing(),
            EngineEvent::Paused => {
                if self.status == SessionStatus::Playing {
                    self.set_status(SessionStatus::Paused);
                }
            }
            EngineEvent::Buffering(buffering) => {
                if buffering && !self.buffering && self.status == SessionStatus::Playing {
                    self.metrics.stall_count += 1;
                }
                self.buffering = buffering;
            }
            EngineEvent::Error(reason) => self.on_engine_failure(reason),
            EngineEvent::Ended => self.on_engine_failure("stream ended".to_string()),
        }
    }

    fn on_playing(&mut self) {
        self.buffering = false;
        if self.status == SessionStatus::Playing {
            return;
        }
        if let Some(started) = self.cycle_started_at.take() {
            self.metrics.startup_latency_ms = Some(started.elapsed().as_millis() as u64);
        }
        if self.retry_count > 0 {
            log::info!(
                "[Session] Playback recovered after {} failed attempt(s)",
                self.retry_count
            );
        }
        self.retry_count = 0;
        self.set_status(SessionStatus::Playing);
        self.start_periodic_probing();
    }

    fn on_engine_failure(&mut self, reason: String) {
        log::warn!("[Session] Engine failure: {}", reason);
        self.detach_engine();
        self.deps.availability.stop_periodic();

        let token = self.token.as_ref().map(|t| t.value().to_string());
        match token {
            Some(token) if self.is_active => {
                self.launch(CycleKind::EngineCheck { token, reason });
            }
            _ => self.fail(SessionError::EngineFault(reason)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Availability
    // ─────────────────────────────────────────────────────────────────────────

    fn start_periodic_probing(&self) {
        let (Some(interval), Some(token)) = (self.policy.periodic_probe_interval, &self.token) else {
            return;
        };
        if self.is_active {
            self.deps
                .availability
                .start_periodic(token.value().to_string(), interval);
        }
    }

    fn observe_probe(&mut self, result: Option<AvailabilityResult>) {
        let Some(result) = result else {
            return;
        };
        if result.token_rejected {
            // A running cycle reports its own rejection.
            if self.cycle_cancel.is_some() {
                return;
            }
            if self.token.take().is_some() {
                log::info!("[Session] Probe rejected the stream token, renewing on next cycle");
                self.deps.tokens.invalidate();
                self.force_token_refresh = true;
                self.deps.availability.stop_periodic();
            }
            return;
        }
        self.record_availability(&result);
    }

    fn record_availability(&mut self, result: &AvailabilityResult) {
        if result.token_rejected || self.stream_online == Some(result.online) {
            return;
        }
        self.stream_online = Some(result.online);
        self.deps.emitter.emit_availability(AvailabilityEvent::Changed {
            online: result.online,
            detail: result.detail.clone(),
            timestamp: result.checked_at,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publication
    // ─────────────────────────────────────────────────────────────────────────

    fn set_status(&mut self, status: SessionStatus) {
        if self.status == status {
            return;
        }
        let previous = std::mem::replace(&mut self.status, status);
        log::info!(
            "[Session] {:?} -> {:?} (retries: {})",
            previous,
            status,
            self.retry_count
        );
        self.deps.emitter.emit_session(SessionEvent::StatusChanged {
            previous,
            status,
            retry_count: self.retry_count,
            timestamp: now_millis(),
        });
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            status: self.status,
            retry_count: self.retry_count,
            stream_online: self.stream_online,
            current_quality: self
                .sources
                .as_ref()
                .and_then(SourceSet::active)
                .map(|s| s.quality.clone()),
            available_qualities: self
                .sources
                .as_ref()
                .map(SourceSet::qualities)
                .unwrap_or_default(),
            is_active: self.is_active,
            buffering: self.buffering,
            metrics: self.metrics.clone(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

fn offline_detail(availability: &AvailabilityResult) -> String {
    availability
        .detail
        .clone()
        .unwrap_or_else(|| "stream is not live".to_string())
}

async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
