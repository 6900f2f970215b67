//! Endpoint context for the admission API and the media server.
//!
//! This module provides [`ApiEndpoints`] which bundles the two base URLs a
//! session talks to and builds every request and playlist URL from them.

use reqwest::Url;

use crate::protocol_constants::{QUALITIES_PATH, STATUS_PATH, TOKEN_PATH};
use crate::state::Config;

/// Validated base URLs shared across services.
///
/// Both bases are stored without a trailing slash so paths can be appended
/// directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    api_base: String,
    media_base: String,
}

impl ApiEndpoints {
    /// Creates endpoints from explicit base URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if either base is not an absolute `http(s)` URL.
    pub fn new(api_base: &str, media_base: &str) -> Result<Self, String> {
        Ok(Self {
            api_base: normalize_base("api_base_url", api_base)?,
            media_base: normalize_base("media_base_url", media_base)?,
        })
    }

    /// Creates endpoints from the session configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if either configured base URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        Self::new(&config.api_base_url, &config.media_base_url)
    }

    /// URL of the token issuance endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}{}", self.api_base, TOKEN_PATH)
    }

    /// URL of the availability probe endpoint.
    #[must_use]
    pub fn status_url(&self) -> String {
        format!("{}{}", self.api_base, STATUS_PATH)
    }

    /// URL of the quality catalog endpoint.
    #[must_use]
    pub fn qualities_url(&self) -> String {
        format!("{}{}", self.api_base, QUALITIES_PATH)
    }

    /// Absolute URL of a playlist on the media server.
    ///
    /// `path` is relative to the media base (no leading slash required).
    #[must_use]
    pub fn media_url(&self, path: &str) -> String {
        format!("{}/{}", self.media_base, path.trim_start_matches('/'))
    }

    /// Media base URL without trailing slash.
    #[must_use]
    pub fn media_base(&self) -> &str {
        &self.media_base
    }
}

fn normalize_base(field: &str, raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| format!("{} '{}' is invalid: {}", field, raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(format!("{} must use http or https, got '{}'", field, other)),
    }
}
