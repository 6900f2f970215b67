//! Host lifecycle coordination.
//!
//! Hosts report visibility through [`HostSignal`]s (a browser tab hidden, a
//! mobile app backgrounded, a TV app losing focus). The
//! [`LifecycleCoordinator`] turns that noisy stream into clean transitions
//! and forwards them to [`LifecycleHooks`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Visibility signal from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostSignal {
    /// Host is in the foreground.
    Active,
    /// Host went to the background.
    Inactive,
    /// Host is tearing the screen down.
    Teardown,
}

/// Reactions to host lifecycle transitions.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Host came back to the foreground after being inactive.
    async fn on_activate(&self);

    /// Host went to the background.
    async fn on_deactivate(&self);

    /// Host is going away; release everything.
    async fn on_teardown(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Active,
    Inactive,
    TornDown,
}

/// Deduplicates host signals and drives [`LifecycleHooks`].
pub struct LifecycleCoordinator {
    hooks: Arc<dyn LifecycleHooks>,
    state: Mutex<HostState>,
}

impl LifecycleCoordinator {
    /// Creates a coordinator. The host is assumed to start in the foreground.
    pub fn new(hooks: Arc<dyn LifecycleHooks>) -> Self {
        Self {
            hooks,
            state: Mutex::new(HostState::Active),
        }
    }

    /// Applies one host signal.
    ///
    /// Returns `true` if the signal caused a transition. Repeated signals,
    /// `Active` without a prior `Inactive`, and anything after `Teardown`
    /// are ignored.
    pub async fn signal(&self, signal: HostSignal) -> bool {
        let transition = {
            let mut state = self.state.lock();
            let next = match (*state, signal) {
                (HostState::TornDown, _) => None,
                (_, HostSignal::Teardown) => Some(HostState::TornDown),
                (HostState::Active, HostSignal::Inactive) => Some(HostState::Inactive),
                (HostState::Inactive, HostSignal::Active) => Some(HostState::Active),
                _ => None,
            };
            if let Some(next) = next {
                *state = next;
            }
            next
        };

        let Some(next) = transition else {
            log::debug!("[Lifecycle] Ignoring redundant {:?}", signal);
            return false;
        };

        log::info!("[Lifecycle] Host {:?}", signal);
        match next {
            HostState::Active => self.hooks.on_activate().await,
            HostState::Inactive => self.hooks.on_deactivate().await,
            HostState::TornDown => self.hooks.on_teardown().await,
        }
        true
    }

    /// Returns `true` while the host is in the foreground.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.state.lock() == HostState::Active
    }

    /// Returns `true` once `Teardown` was applied.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        *self.state.lock() == HostState::TornDown
    }

    /// Drives the coordinator from a signal channel until teardown,
    /// cancellation, or the channel closing.
    pub async fn run(self: Arc<Self>, mut signals: mpsc::Receiver<HostSignal>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("[Lifecycle] Cancelled");
                    break;
                }
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        self.signal(signal).await;
                        if self.is_torn_down() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHooks {
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        teardowns: AtomicUsize,
    }

    #[async_trait]
    impl LifecycleHooks for CountingHooks {
        async fn on_activate(&self) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator() -> (Arc<CountingHooks>, Arc<LifecycleCoordinator>) {
        let hooks = Arc::new(CountingHooks::default());
        let coordinator = Arc::new(LifecycleCoordinator::new(
            Arc::clone(&hooks) as Arc<dyn LifecycleHooks>
        ));
        (hooks, coordinator)
    }

    #[tokio::test]
    async fn active_without_prior_inactive_is_ignored() {
        let (hooks, coordinator) = coordinator();

        assert!(!coordinator.signal(HostSignal::Active).await);
        assert_eq!(hooks.activations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_signals_are_deduplicated() {
        let (hooks, coordinator) = coordinator();

        assert!(coordinator.signal(HostSignal::Inactive).await);
        assert!(!coordinator.signal(HostSignal::Inactive).await);
        assert!(coordinator.signal(HostSignal::Active).await);
        assert!(!coordinator.signal(HostSignal::Active).await);

        assert_eq!(hooks.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.activations.load(Ordering::SeqCst), 1);
        assert!(coordinator.is_active());
    }

    #[tokio::test]
    async fn signals_after_teardown_are_ignored() {
        let (hooks, coordinator) = coordinator();

        assert!(coordinator.signal(HostSignal::Teardown).await);
        assert!(!coordinator.signal(HostSignal::Inactive).await);
        assert!(!coordinator.signal(HostSignal::Teardown).await);

        assert_eq!(hooks.teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.deactivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_stops_after_teardown() {
        let (hooks, coordinator) = coordinator();
        let (tx, rx) = mpsc::channel(8);

        tx.send(HostSignal::Inactive).await.unwrap();
        tx.send(HostSignal::Active).await.unwrap();
        tx.send(HostSignal::Teardown).await.unwrap();
        tx.send(HostSignal::Inactive).await.unwrap();

        Arc::clone(&coordinator)
            .run(rx, CancellationToken::new())
            .await;

        assert_eq!(hooks.activations.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_exits_on_cancel() {
        let (_hooks, coordinator) = coordinator();
        let (_tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        coordinator.run(rx, cancel).await;
    }
}
