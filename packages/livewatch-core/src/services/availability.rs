//! Stream availability probing.
//!
//! Responsibilities:
//! - One-shot probes used by initialization cycles
//! - Optional periodic re-probing while playing
//! - Publishing the latest verdict through a watch channel
//!
//! A probe never fails: timeouts and transport errors become an offline
//! verdict with a reason, and 401/403 additionally flags the token as
//! rejected so the session can renew it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{AdmissionApi, ApiError, StatusPayload};
use crate::runtime::{TaskSpawner, TaskSpawnerExt};
use crate::utils::now_millis;

/// Diagnostic fields reported by the admission API alongside the verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDiagnostics {
    /// Media server state string.
    pub status: Option<String>,
    /// Probed stream name.
    pub stream_name: Option<String>,
    /// Whether a WebRTC output is published.
    pub has_webrtc: bool,
    /// Whether an LLHLS output is published.
    pub has_llhls: bool,
    /// Streams currently published on the media server.
    pub total_active_streams: u32,
}

/// Outcome of one availability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResult {
    /// Whether the stream is live.
    pub online: bool,
    /// Unix timestamp in milliseconds when the probe completed.
    pub checked_at: u64,
    /// Reason when offline.
    pub detail: Option<String>,
    /// The server rejected the stream token (401/403).
    pub token_rejected: bool,
    /// Server-side diagnostics, when the probe reached the server.
    pub diagnostics: Option<StreamDiagnostics>,
}

impl AvailabilityResult {
    fn offline(detail: impl Into<String>) -> Self {
        Self {
            online: false,
            checked_at: now_millis(),
            detail: Some(detail.into()),
            token_rejected: false,
            diagnostics: None,
        }
    }

    fn from_payload(payload: StatusPayload) -> Self {
        let detail = if payload.online {
            None
        } else {
            Some(
                payload
                    .error
                    .clone()
                    .or_else(|| payload.status.clone())
                    .unwrap_or_else(|| "stream is not live".to_string()),
            )
        };
        Self {
            online: payload.online,
            checked_at: now_millis(),
            detail,
            token_rejected: false,
            diagnostics: Some(StreamDiagnostics {
                status: payload.status,
                stream_name: payload.stream_name,
                has_webrtc: payload.has_webrtc,
                has_llhls: payload.has_llhls,
                total_active_streams: payload.total_active_streams,
            }),
        }
    }
}

/// Probes stream availability on demand and, optionally, periodically.
pub struct AvailabilityMonitor {
    api: Arc<dyn AdmissionApi>,
    spawner: Arc<dyn TaskSpawner>,
    timeout: Duration,
    /// Generation token; `stop()` cancels it and installs a fresh one.
    cancel: Mutex<CancellationToken>,
    /// Token of the running periodic task, if any.
    periodic: Mutex<Option<CancellationToken>>,
    latest_tx: watch::Sender<Option<AvailabilityResult>>,
}

impl AvailabilityMonitor {
    /// Creates a new monitor.
    ///
    /// # Arguments
    /// * `api` - Admission API used for status requests
    /// * `spawner` - Spawner for the periodic probe task
    /// * `timeout` - Upper bound on a single probe
    pub fn new(api: Arc<dyn AdmissionApi>, spawner: Arc<dyn TaskSpawner>, timeout: Duration) -> Self {
        let (latest_tx, _) = watch::channel(None);
        Self {
            api,
            spawner,
            timeout,
            cancel: Mutex::new(CancellationToken::new()),
            periodic: Mutex::new(None),
            latest_tx,
        }
    }

    /// Probes availability once.
    ///
    /// Returns `None` only if [`stop`](Self::stop) was called while the probe
    /// was in flight.
    pub async fn probe(&self, stream_token: &str) -> Option<AvailabilityResult> {
        let cancel = self.cancel.lock().clone();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("[Availability] Probe cancelled");
                return None;
            }
            result = probe_once(self.api.as_ref(), stream_token, self.timeout) => result,
        };

        self.latest_tx.send_replace(Some(result.clone()));
        Some(result)
    }

    /// Starts re-probing every `interval`, replacing any running periodic task.
    ///
    /// The first probe happens one interval from now.
    pub fn start_periodic(&self, stream_token: String, interval: Duration) {
        let task_cancel = self.cancel.lock().child_token();
        if let Some(previous) = self.periodic.lock().replace(task_cancel.clone()) {
            previous.cancel();
        }

        let api = Arc::clone(&self.api);
        let timeout = self.timeout;
        let latest_tx = self.latest_tx.clone();

        log::info!(
            "[Availability] Periodic probing every {}s",
            interval.as_secs()
        );

        self.spawner.spawn_cancellable(task_cancel, async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let result = probe_once(api.as_ref(), &stream_token, timeout).await;
                log::debug!(
                    "[Availability] Periodic probe: online={} {}",
                    result.online,
                    result.detail.as_deref().unwrap_or("")
                );
                latest_tx.send_replace(Some(result));
            }
        });
    }

    /// Cancels in-flight probes and the periodic task.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        previous.cancel();
        if self.periodic.lock().take().is_some() {
            log::info!("[Availability] Periodic probing stopped");
        }
    }

    /// Stops only the periodic task, leaving one-shot probes untouched.
    pub fn stop_periodic(&self) {
        if let Some(token) = self.periodic.lock().take() {
            token.cancel();
            log::info!("[Availability] Periodic probing stopped");
        }
    }

    /// Returns `true` while a periodic task is running.
    #[must_use]
    pub fn is_periodic_running(&self) -> bool {
        self.periodic
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Subscribes to the latest verdict.
    pub fn subscribe(&self) -> watch::Receiver<Option<AvailabilityResult>> {
        self.latest_tx.subscribe()
    }

    /// Latest verdict, if any probe has completed.
    #[must_use]
    pub fn latest(&self) -> Option<AvailabilityResult> {
        self.latest_tx.borrow().clone()
    }
}

async fn probe_once(api: &dyn AdmissionApi, stream_token: &str, timeout: Duration) -> AvailabilityResult {
    match tokio::time::timeout(timeout, api.stream_status(stream_token)).await {
        Err(_) => {
            log::warn!("[Availability] Probe timed out after {:?}", timeout);
            AvailabilityResult::offline(ApiError::Timeout.to_string())
        }
        Ok(Err(ApiError::Unauthorized(code))) => {
            log::warn!("[Availability] Stream token rejected (HTTP {})", code);
            AvailabilityResult {
                token_rejected: true,
                ..AvailabilityResult::offline(format!("stream token rejected (HTTP {})", code))
            }
        }
        Ok(Err(e)) => {
            log::warn!("[Availability] Probe failed: {}", e);
            AvailabilityResult::offline(e.to_string())
        }
        Ok(Ok(payload)) => AvailabilityResult::from_payload(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioSpawner;
    use crate::test_fixtures::{FakeAdmissionApi, ProbeReply};

    fn monitor(api: &Arc<FakeAdmissionApi>) -> Arc<AvailabilityMonitor> {
        Arc::new(AvailabilityMonitor::new(
            Arc::clone(api) as Arc<dyn AdmissionApi>,
            Arc::new(TokioSpawner::current()),
            Duration::from_secs(8),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn online_payload_yields_online_verdict() {
        let api = Arc::new(FakeAdmissionApi::new());
        let monitor = monitor(&api);

        let result = monitor.probe("t").await.unwrap();

        assert!(result.online);
        assert!(result.detail.is_none());
        assert!(result.diagnostics.unwrap().has_llhls);
        assert_eq!(monitor.latest().map(|r| r.online), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_offline_with_reason() {
        let api = Arc::new(FakeAdmissionApi::new());
        api.push_probe(Duration::from_secs(30), ProbeReply::Online);
        let monitor = monitor(&api);

        let result = monitor.probe("t").await.unwrap();

        assert!(!result.online);
        assert!(!result.token_rejected);
        assert!(result.detail.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_token_is_flagged() {
        let api = Arc::new(FakeAdmissionApi::new());
        api.push_probe(Duration::ZERO, ProbeReply::Unauthorized);
        let monitor = monitor(&api);

        let result = monitor.probe("t").await.unwrap();

        assert!(!result.online);
        assert!(result.token_rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_is_offline_without_rejection() {
        let api = Arc::new(FakeAdmissionApi::new());
        api.push_probe(Duration::ZERO, ProbeReply::ServerError);
        let monitor = monitor(&api);

        let result = monitor.probe("t").await.unwrap();

        assert!(!result.online);
        assert!(!result.token_rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_probe() {
        let api = Arc::new(FakeAdmissionApi::new());
        api.push_probe(Duration::from_secs(5), ProbeReply::Online);
        let monitor = monitor(&api);

        let probing = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.probe("t").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.stop();

        assert!(probing.await.unwrap().is_none());
        assert!(monitor.latest().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_probing_publishes_until_stopped() {
        let api = Arc::new(FakeAdmissionApi::new());
        let monitor = monitor(&api);
        let mut rx = monitor.subscribe();

        monitor.start_periodic("t".into(), Duration::from_secs(30));
        assert!(monitor.is_periodic_running());

        rx.changed().await.unwrap();
        assert_eq!(api.status_calls(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(api.status_calls(), 2);

        monitor.stop();
        assert!(!monitor.is_periodic_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_periodic_replaces_previous_task() {
        let api = Arc::new(FakeAdmissionApi::new());
        let monitor = monitor(&api);

        monitor.start_periodic("a".into(), Duration::from_secs(10));
        monitor.start_periodic("b".into(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(api.status_calls(), 1);
        assert_eq!(api.last_status_token().as_deref(), Some("b"));
    }
}
