//! Stream token lifecycle.
//!
//! Responsibilities:
//! - Cache the stream token and reuse it while it is comfortably valid
//! - Collapse concurrent acquisitions into a single issuance request
//! - Invalidate on explicit request (token rejected by the server)
//!
//! The in-flight issuance is a [`Shared`] future: every concurrent caller
//! awaits the same request, and the request itself installs its result in
//! the cache. A caller that is cancelled drops only its own handle; the
//! request keeps going as long as any other caller still awaits it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

use crate::api::AdmissionApi;

/// Errors from token acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The admission API could not issue a token (network, timeout, 401, 5xx).
    #[error("Stream token unavailable: {0}")]
    AuthUnavailable(String),
}

/// A stream token with its local expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToken {
    value: String,
    issued_at: Instant,
    expires_at: Instant,
}

impl StreamToken {
    /// Creates a token issued now and valid for `ttl`.
    #[must_use]
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        let issued_at = Instant::now();
        Self {
            value: value.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// The opaque token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token was received.
    #[must_use]
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// When the token expires.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` while `now < expires_at - margin`.
    #[must_use]
    pub fn is_fresh(&self, margin: Duration) -> bool {
        Instant::now() + margin < self.expires_at
    }

    /// Time left until the token should be renewed (zero if already due).
    #[must_use]
    pub fn time_until_renewal(&self, margin: Duration) -> Duration {
        self.expires_at
            .checked_sub(margin)
            .map(|due| due.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }
}

type TokenOutcome = Result<Option<StreamToken>, TokenError>;
type SharedIssuance = Shared<BoxFuture<'static, TokenOutcome>>;

#[derive(Default)]
struct TokenState {
    cached: Option<StreamToken>,
    /// Issuance currently in flight, tagged with its sequence number.
    in_flight: Option<(u64, SharedIssuance)>,
}

/// Caches the stream token and deduplicates issuance.
pub struct TokenManager {
    api: Arc<dyn AdmissionApi>,
    renewal_margin: Duration,
    state: Arc<Mutex<TokenState>>,
    issuance_seq: AtomicU64,
}

impl TokenManager {
    /// Creates a new token manager.
    ///
    /// # Arguments
    /// * `api` - Admission API used for issuance
    /// * `renewal_margin` - Renew this long before expiry
    pub fn new(api: Arc<dyn AdmissionApi>, renewal_margin: Duration) -> Self {
        Self {
            api,
            renewal_margin,
            state: Arc::new(Mutex::new(TokenState::default())),
            issuance_seq: AtomicU64::new(0),
        }
    }

    /// Returns a usable stream token.
    ///
    /// Reuses the cached token unless it is within the renewal margin or
    /// `force_refresh` is set. Concurrent callers share one issuance request.
    /// Returns `Ok(None)` when there is no authenticated user session.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::AuthUnavailable`] if issuance fails. The cache is
    /// left untouched on failure.
    pub async fn acquire(&self, force_refresh: bool) -> TokenOutcome {
        let issuance = {
            let mut state = self.state.lock();

            if !force_refresh {
                if let Some(token) = state.cached.as_ref() {
                    if token.is_fresh(self.renewal_margin) {
                        return Ok(Some(token.clone()));
                    }
                    log::debug!("[TokenManager] Cached token is within renewal margin");
                }
            }

            match state.in_flight.as_ref() {
                Some((_, issuance)) => {
                    log::debug!("[TokenManager] Joining in-flight issuance");
                    issuance.clone()
                }
                None => {
                    let seq = self.issuance_seq.fetch_add(1, Ordering::Relaxed) + 1;
                    let issuance = self.issue(seq).shared();
                    state.in_flight = Some((seq, issuance.clone()));
                    issuance
                }
            }
        };

        issuance.await
    }

    /// Drops the cached token so the next acquisition issues a new one.
    pub fn invalidate(&self) {
        if self.state.lock().cached.take().is_some() {
            log::info!("[TokenManager] Cached stream token invalidated");
        }
    }

    /// Returns the cached token regardless of freshness.
    #[must_use]
    pub fn cached(&self) -> Option<StreamToken> {
        self.state.lock().cached.clone()
    }

    /// Time until the cached token is due for renewal, `None` if nothing is cached.
    #[must_use]
    pub fn time_until_renewal(&self) -> Option<Duration> {
        self.state
            .lock()
            .cached
            .as_ref()
            .map(|t| t.time_until_renewal(self.renewal_margin))
    }

    /// Builds the issuance future. It installs its own result and clears
    /// the in-flight slot if the slot still belongs to it.
    fn issue(&self, seq: u64) -> BoxFuture<'static, TokenOutcome> {
        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);

        async move {
            log::debug!("[TokenManager] Issuing stream token (#{})", seq);

            let outcome = match api.issue_stream_token().await {
                Ok(Some(issued)) => Ok(Some(StreamToken::new(
                    issued.stream_token,
                    Duration::from_secs(issued.expires_in),
                ))),
                Ok(None) => Ok(None),
                Err(e) => {
                    log::warn!("[TokenManager] Stream token issuance failed: {}", e);
                    Err(TokenError::AuthUnavailable(e.to_string()))
                }
            };

            let mut guard = state.lock();
            match &outcome {
                Ok(Some(token)) => guard.cached = Some(token.clone()),
                Ok(None) => guard.cached = None,
                Err(_) => {}
            }
            if guard.in_flight.as_ref().is_some_and(|(s, _)| *s == seq) {
                guard.in_flight = None;
            }
            drop(guard);

            outcome
        }
        .boxed()
    }
}
