//! Fixed protocol constants shared with the admission API and media server.
//!
//! Paths and query parameter names are defined by the server side and must
//! match it exactly. Tunable behaviour (timeouts, retry policy) lives in
//! [`Config`](crate::state::Config); the values here are only its defaults.

// ─────────────────────────────────────────────────────────────────────────────
// Admission API
// ─────────────────────────────────────────────────────────────────────────────

/// Token issuance endpoint (user bearer credential → stream token).
pub const TOKEN_PATH: &str = "/api/stream/token";

/// Availability probe endpoint (stream bearer token → online flag).
pub const STATUS_PATH: &str = "/api/stream/status";

/// Quality catalog endpoint (stream bearer token → active qualities).
pub const QUALITIES_PATH: &str = "/api/stream/qualities";

/// Query parameter carrying the stream token on media playlist URIs.
pub const TOKEN_QUERY_PARAM: &str = "token";

// ─────────────────────────────────────────────────────────────────────────────
// Media Server Fallback Template
// ─────────────────────────────────────────────────────────────────────────────

/// Low-latency (LLHLS) playlist published by the media server's default app.
pub const FALLBACK_LOW_LATENCY_PLAYLIST: &str = "live/live/abr.m3u8";

/// Standard (MPEG-TS HLS) playlist published by the media server's default app.
pub const FALLBACK_STANDARD_PLAYLIST: &str = "live/live/ts:abr.m3u8";

/// Label of the low-latency fallback source.
pub const FALLBACK_LOW_LATENCY_LABEL: &str = "Low latency";

/// Label of the standard fallback source.
pub const FALLBACK_STANDARD_LABEL: &str = "Standard";

/// Quality name of the adaptive (ABR) source when the catalog exposes one.
pub const ABR_QUALITY_NAME: &str = "abr";

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for every admission API request (seconds).
///
/// Timeout is treated exactly like a network failure.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 8;

/// Renewal margin before token expiry (seconds).
///
/// A cached token is reused only while `now < expiry - margin`.
pub const DEFAULT_TOKEN_RENEWAL_MARGIN_SECS: u64 = 300;

/// Consecutive failed attempts before the session settles offline.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Minimum interval between automatic retries (seconds).
pub const DEFAULT_MIN_RETRY_INTERVAL_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// User agent sent with every admission API request.
pub const USER_AGENT: &str = concat!("livewatch/", env!("CARGO_PKG_VERSION"));
