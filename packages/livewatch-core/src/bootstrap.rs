//! Session bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where the token
//! manager, availability monitor, source selector, event bridge, playback
//! session, and lifecycle coordinator are instantiated and wired together.
//! A host calls it when a player screen mounts and calls
//! [`BootstrappedSession::shutdown`] when the screen goes away.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{AdmissionApi, CredentialProvider, HttpAdmissionApi};
use crate::context::ApiEndpoints;
use crate::engine::PlaybackEngine;
use crate::error::{LivewatchError, LivewatchResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::lifecycle::{HostSignal, LifecycleCoordinator, LifecycleHooks};
use crate::protocol_constants::USER_AGENT;
use crate::runtime::{TaskSpawner, TaskSpawnerExt, TokioSpawner};
use crate::services::availability::AvailabilityMonitor;
use crate::services::session::{PlaybackSession, SessionDeps, SessionPolicy};
use crate::services::source_selector::SourceSelector;
use crate::services::token_manager::TokenManager;
use crate::state::Config;

/// Container for a fully wired playback session.
#[derive(Clone)]
pub struct BootstrappedSession {
    /// Handle to the session actor.
    pub session: PlaybackSession,
    /// Coordinator forwarding host visibility to the session.
    pub lifecycle: Arc<LifecycleCoordinator>,
    /// Stream token cache shared by the session's cycles.
    pub token_manager: Arc<TokenManager>,
    /// Availability prober.
    pub availability: Arc<AvailabilityMonitor>,
    /// Event bridge for observers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Task spawner for background operations.
    pub spawner: Arc<dyn TaskSpawner>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedSession {
    /// Runs the lifecycle coordinator on a background task and returns the
    /// sender hosts use to report visibility.
    pub fn spawn_lifecycle(&self, capacity: usize) -> mpsc::Sender<HostSignal> {
        let (tx, rx) = mpsc::channel(capacity);
        let lifecycle = Arc::clone(&self.lifecycle);
        let cancel = self.cancel_token.clone();
        self.spawner.spawn(async move {
            lifecycle.run(rx, cancel).await;
        });
        tx
    }

    /// Tears the session down and cancels every background task.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Teardown through the coordinator so later host signals are ignored.
        self.lifecycle.signal(HostSignal::Teardown).await;
        self.availability.stop();
        self.cancel_token.cancel();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the HTTP client shared by all admission API calls.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn create_http_client(timeout: Duration) -> LivewatchResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LivewatchError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps a playback session talking to the real admission API.
///
/// Must be called from within a Tokio runtime.
///
/// # Arguments
/// * `config` - Session configuration
/// * `credentials` - Source of the user's bearer credential
/// * `engine` - Platform playback engine
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be created.
pub fn bootstrap_session(
    config: &Config,
    credentials: Arc<dyn CredentialProvider>,
    engine: Arc<dyn PlaybackEngine>,
) -> LivewatchResult<BootstrappedSession> {
    config.validate().map_err(LivewatchError::Configuration)?;
    let endpoints = ApiEndpoints::from_config(config).map_err(LivewatchError::Configuration)?;

    let http_client = create_http_client(config.request_timeout())?;
    let api: Arc<dyn AdmissionApi> = Arc::new(HttpAdmissionApi::new(
        http_client,
        endpoints,
        credentials,
        config.request_timeout(),
    ));

    bootstrap_session_with_api(config, api, engine, Arc::new(TokioSpawner::current()))
}

/// Bootstraps a playback session over an arbitrary [`AdmissionApi`].
///
/// Wiring order:
///
/// 1. Endpoints and shared infrastructure (event bridge, cancellation token)
/// 2. Token manager (depends on the API)
/// 3. Availability monitor and source selector (depend on the API)
/// 4. Session actor (depends on all of the above plus the engine)
/// 5. Lifecycle coordinator (depends on the session)
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn bootstrap_session_with_api(
    config: &Config,
    api: Arc<dyn AdmissionApi>,
    engine: Arc<dyn PlaybackEngine>,
    spawner: Arc<dyn TaskSpawner>,
) -> LivewatchResult<BootstrappedSession> {
    config.validate().map_err(LivewatchError::Configuration)?;
    let endpoints = ApiEndpoints::from_config(config).map_err(LivewatchError::Configuration)?;

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    let cancel_token = CancellationToken::new();

    let token_manager = Arc::new(TokenManager::new(
        Arc::clone(&api),
        config.token_renewal_margin(),
    ));

    let availability = Arc::new(AvailabilityMonitor::new(
        Arc::clone(&api),
        Arc::clone(&spawner),
        config.request_timeout(),
    ));

    let selector = Arc::new(SourceSelector::new(
        api,
        endpoints,
        config.request_timeout(),
        config.include_abr_source,
    ));

    let session = PlaybackSession::spawn(
        SessionDeps {
            tokens: Arc::clone(&token_manager),
            availability: Arc::clone(&availability),
            selector,
            engine,
            emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
            spawner: Arc::clone(&spawner),
        },
        SessionPolicy::from_config(config),
        config.command_channel_capacity,
        cancel_token.child_token(),
    );

    let lifecycle = Arc::new(LifecycleCoordinator::new(
        Arc::new(session.clone()) as Arc<dyn LifecycleHooks>
    ));

    log::info!(
        "[Bootstrap] Session ready (api: {}, media: {}, retries: {})",
        config.api_base_url,
        config.media_base_url,
        config.max_retry_attempts
    );

    Ok(BootstrappedSession {
        session,
        lifecycle,
        token_manager,
        availability,
        event_bridge,
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastEvent, SessionEvent};
    use crate::state::SessionStatus;
    use crate::test_fixtures::{FakeAdmissionApi, ScriptedEngine};

    fn bootstrap(config: &Config) -> LivewatchResult<BootstrappedSession> {
        bootstrap_session_with_api(
            config,
            Arc::new(FakeAdmissionApi::new()),
            Arc::new(ScriptedEngine::playing()),
            Arc::new(TokioSpawner::current()),
        )
    }

    #[test]
    fn http_client_is_created() {
        let client = create_http_client(Duration::from_secs(8)).unwrap();
        assert!(client.get("http://example.com").build().is_ok());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = Config {
            max_retry_attempts: 0,
            ..Config::default()
        };

        let err = bootstrap(&config).err().unwrap();
        assert!(matches!(err, LivewatchError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn wired_session_plays_and_broadcasts() {
        let services = bootstrap(&Config::default()).unwrap();
        let mut events = services.event_bridge.subscribe();

        services.session.start().await.unwrap();
        let mut rx = services.session.subscribe();
        rx.wait_for(|s| s.status == SessionStatus::Playing)
            .await
            .unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(
            first,
            BroadcastEvent::Session(SessionEvent::StatusChanged {
                status: SessionStatus::Connecting,
                ..
            })
        ));
        assert!(services.token_manager.cached().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_signals_reach_session() {
        let services = bootstrap(&Config::default()).unwrap();
        let signals = services.spawn_lifecycle(8);

        signals.send(HostSignal::Inactive).await.unwrap();
        let mut rx = services.session.subscribe();
        rx.wait_for(|s| !s.is_active).await.unwrap();

        signals.send(HostSignal::Active).await.unwrap();
        rx.wait_for(|s| s.is_active).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_session() {
        let services = bootstrap(&Config::default()).unwrap();
        services.session.start().await.unwrap();

        services.shutdown().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(services.session.is_closed());
        assert!(services.lifecycle.is_torn_down());
    }
}
