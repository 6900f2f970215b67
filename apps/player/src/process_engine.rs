//! Playback engine backed by an external player process.
//!
//! The configured command template is split on whitespace and `{uri}` is
//! replaced by the playlist URI (appended if the template has no
//! placeholder). An external player cannot pause a live stream, so pause
//! kills the process and play relaunches it at the live edge.
//!
//! A spawned process is only reported as playing once it has survived the
//! startup grace period; a player that exits before that (unreachable
//! playlist, decoder failure) reports an error without ever playing.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Result};
use livewatch_core::utils::redact_token;
use livewatch_core::{EngineError, EngineEvent, EngineEventSink, PlaybackEngine, StreamSource};
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

const URI_PLACEHOLDER: &str = "{uri}";

/// Default time a player must stay alive before it counts as playing.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(3);

struct Attached {
    uri: String,
    events: EngineEventSink,
    /// Cancels the running process; `None` while paused.
    run: Option<CancellationToken>,
}

/// Engine that spawns one player process per attachment.
pub struct ProcessEngine {
    template: Vec<String>,
    startup_grace: Duration,
    attached: Mutex<Option<Attached>>,
}

impl ProcessEngine {
    /// Creates an engine from a command template such as `ffplay -autoexit {uri}`.
    pub fn new(template: &str) -> Result<Self> {
        let template: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if template.is_empty() {
            bail!("player command must not be empty");
        }
        Ok(Self {
            template,
            startup_grace: DEFAULT_STARTUP_GRACE,
            attached: Mutex::new(None),
        })
    }

    /// Sets how long a player must stay alive before it counts as playing.
    #[must_use]
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Builds the argument vector for `uri`.
    fn argv(&self, uri: &str) -> Vec<String> {
        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|arg| arg.replace(URI_PLACEHOLDER, uri))
            .collect();
        if !self.template.iter().any(|arg| arg.contains(URI_PLACEHOLDER)) {
            argv.push(uri.to_string());
        }
        argv
    }

    fn launch(&self, attached: &mut Attached) -> Result<(), EngineError> {
        let argv = self.argv(&attached.uri);
        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Attach {
                uri: redact_token(&attached.uri),
                reason: format!("failed to spawn '{}': {}", argv[0], e),
            })?;

        log::info!(
            "[ProcessEngine] Spawned '{}' (pid {:?}) for attachment #{}",
            argv[0],
            child.id(),
            attached.events.attachment()
        );

        let run = CancellationToken::new();
        attached.run = Some(run.clone());
        tokio::spawn(supervise(
            child,
            run,
            attached.events.clone(),
            self.startup_grace,
        ));
        Ok(())
    }
}

/// Reports `Playing` once the player outlives `grace`, then waits for it to
/// exit. Kills the player when `run` is cancelled.
async fn supervise(mut child: Child, run: CancellationToken, events: EngineEventSink, grace: Duration) {
    let startup = tokio::time::sleep(grace);
    tokio::pin!(startup);
    let mut started = false;

    let status = loop {
        tokio::select! {
            biased;
            _ = run.cancelled() => {
                if let Err(e) = child.kill().await {
                    log::warn!("[ProcessEngine] Failed to kill player: {}", e);
                }
                return;
            }
            status = child.wait() => break status,
            _ = &mut startup, if !started => {
                started = true;
                log::debug!("[ProcessEngine] Player alive after {:?}", grace);
                events.emit(EngineEvent::Playing);
            }
        }
    };

    if run.is_cancelled() {
        return;
    }

    let event = match status {
        Ok(status) if status.success() => EngineEvent::Ended,
        Ok(status) => EngineEvent::Error(format!("player exited with {}", status)),
        Err(e) => EngineEvent::Error(format!("failed to wait for player: {}", e)),
    };
    log::info!("[ProcessEngine] Player exited: {:?}", event);
    events.emit(event);
}

impl PlaybackEngine for ProcessEngine {
    fn attach(&self, source: &StreamSource, events: EngineEventSink) -> Result<(), EngineError> {
        let mut guard = self.attached.lock();
        if let Some(previous) = guard.take() {
            if let Some(run) = previous.run {
                run.cancel();
            }
        }

        let mut attached = Attached {
            uri: source.uri.clone(),
            events,
            run: None,
        };
        self.launch(&mut attached)?;

        attached.events.emit(EngineEvent::Ready);
        *guard = Some(attached);
        Ok(())
    }

    fn detach(&self) {
        if let Some(attached) = self.attached.lock().take() {
            if let Some(run) = attached.run {
                run.cancel();
            }
            log::info!("[ProcessEngine] Detached #{}", attached.events.attachment());
        }
    }

    fn play(&self) -> Result<(), EngineError> {
        let mut guard = self.attached.lock();
        let attached = guard.as_mut().ok_or(EngineError::NotAttached)?;
        if attached.run.is_some() {
            return Ok(());
        }
        self.launch(attached)?;
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        let mut guard = self.attached.lock();
        let attached = guard.as_mut().ok_or(EngineError::NotAttached)?;
        if let Some(run) = attached.run.take() {
            run.cancel();
            attached.events.emit(EngineEvent::Paused);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use livewatch_core::api::{ApiError, ApiResult, IssuedToken, QualityCatalog, StatusPayload};
    use livewatch_core::{
        bootstrap_session_with_api, AdmissionApi, BroadcastEvent, Config, FailureEvent,
        LatencyProfile, SessionError, SessionStatus, TokioSpawner,
    };
    use tokio::sync::mpsc;

    const SHORT_GRACE: Duration = Duration::from_millis(500);

    fn source(uri: &str) -> StreamSource {
        StreamSource {
            label: "Low latency".to_string(),
            quality: "abr".to_string(),
            uri: uri.to_string(),
            latency_profile: LatencyProfile::LowLatency,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<(u64, EngineEvent)>) -> EngineEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .1
    }

    /// Admission API that always issues a token and reports the stream live.
    struct LiveStreamApi;

    #[async_trait]
    impl AdmissionApi for LiveStreamApi {
        async fn issue_stream_token(&self) -> ApiResult<Option<IssuedToken>> {
            Ok(Some(IssuedToken {
                stream_token: "stream-token".to_string(),
                expires_in: 21_600,
            }))
        }

        async fn stream_status(&self, _stream_token: &str) -> ApiResult<StatusPayload> {
            Ok(StatusPayload {
                online: true,
                ..StatusPayload::default()
            })
        }

        async fn stream_qualities(&self, _stream_token: &str) -> ApiResult<QualityCatalog> {
            Err(ApiError::HttpStatus(404, "no catalog".to_string()))
        }
    }

    #[test]
    fn substitutes_uri_placeholder() {
        let engine = ProcessEngine::new("mpv --profile=low-latency {uri}").unwrap();
        assert_eq!(
            engine.argv("https://m/x.m3u8"),
            ["mpv", "--profile=low-latency", "https://m/x.m3u8"]
        );
    }

    #[test]
    fn appends_uri_without_placeholder() {
        let engine = ProcessEngine::new("vlc").unwrap();
        assert_eq!(engine.argv("u"), ["vlc", "u"]);
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(ProcessEngine::new("   ").is_err());
    }

    #[tokio::test]
    async fn transport_commands_require_attachment() {
        let engine = ProcessEngine::new("true").unwrap();
        assert!(matches!(engine.play(), Err(EngineError::NotAttached)));
        assert!(matches!(engine.pause(), Err(EngineError::NotAttached)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_clean_exit_reports_ended_without_playing() {
        let engine = ProcessEngine::new("true {uri}")
            .unwrap()
            .with_startup_grace(Duration::from_secs(2));
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine
            .attach(&source("https://m/x.m3u8"), EngineEventSink::new(1, tx))
            .unwrap();

        assert_eq!(next_event(&mut rx).await, EngineEvent::Ready);
        assert_eq!(next_event(&mut rx).await, EngineEvent::Ended);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_failing_exit_reports_error_without_playing() {
        let engine = ProcessEngine::new("false")
            .unwrap()
            .with_startup_grace(Duration::from_secs(2));
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine
            .attach(&source("https://m/x.m3u8"), EngineEventSink::new(7, tx))
            .unwrap();

        assert_eq!(next_event(&mut rx).await, EngineEvent::Ready);
        assert!(matches!(next_event(&mut rx).await, EngineEvent::Error(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn surviving_player_reports_playing_after_grace() {
        let engine = ProcessEngine::new("sleep 30")
            .unwrap()
            .with_startup_grace(SHORT_GRACE);
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine
            .attach(&source("5"), EngineEventSink::new(1, tx))
            .unwrap();

        assert_eq!(next_event(&mut rx).await, EngineEvent::Ready);
        assert_eq!(next_event(&mut rx).await, EngineEvent::Playing);

        engine.pause().unwrap();
        assert_eq!(next_event(&mut rx).await, EngineEvent::Paused);
        engine.play().unwrap();
        assert_eq!(next_event(&mut rx).await, EngineEvent::Playing);

        engine.detach();
        assert!(matches!(engine.pause(), Err(EngineError::NotAttached)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn always_failing_player_exhausts_retry_budget() {
        let config = Config {
            max_retry_attempts: 3,
            retry_delay_secs: 1,
            min_retry_interval_secs: 1,
            ..Config::default()
        };
        let engine = ProcessEngine::new("false")
            .unwrap()
            .with_startup_grace(SHORT_GRACE);
        let services = bootstrap_session_with_api(
            &config,
            Arc::new(LiveStreamApi),
            Arc::new(engine),
            Arc::new(TokioSpawner::current()),
        )
        .unwrap();
        let mut events = services.event_bridge.subscribe();

        services.session.start().await.unwrap();
        let mut rx = services.session.subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(20),
            rx.wait_for(|s| s.status == SessionStatus::Offline),
        )
        .await
        .expect("session never settled offline")
        .unwrap()
        .clone();

        assert_eq!(snapshot.retry_count, 3);
        assert_eq!(snapshot.metrics.attach_count, 3);

        let mut failures = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let BroadcastEvent::Failure(FailureEvent::Reported { error, .. }) = event {
                failures.push(error);
            }
        }
        assert_eq!(
            failures.last(),
            Some(&SessionError::RetryExhausted { attempts: 3 })
        );

        services.shutdown().await;
    }

    #[tokio::test]
    async fn missing_binary_fails_attach() {
        let engine = ProcessEngine::new("/nonexistent/livewatch-player-binary").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine
            .attach(&source("https://m/x.m3u8?token=secret"), EngineEventSink::new(1, tx))
            .unwrap_err();

        assert!(matches!(err, EngineError::Attach { .. }));
        assert!(!err.to_string().contains("secret"));
    }
}
