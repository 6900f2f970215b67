//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Url;

use crate::protocol_constants::TOKEN_QUERY_PARAM;

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Appends the stream token as a query parameter to a media URI.
///
/// Existing query parameters are preserved. Returns `None` if `uri` is not
/// an absolute URL.
pub fn with_token_param(uri: &str, token: &str) -> Option<String> {
    let mut url = Url::parse(uri).ok()?;
    url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
    Some(url.into())
}

/// Strips the token query parameter so URIs can be logged safely.
pub fn redact_token(uri: &str) -> String {
    match uri.find(&format!("{}=", TOKEN_QUERY_PARAM)) {
        Some(pos) => format!("{}{}=…", &uri[..pos], TOKEN_QUERY_PARAM),
        None => uri.to_string(),
    }
}
