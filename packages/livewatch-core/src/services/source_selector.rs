//! Stream source resolution and selection.
//!
//! [`SourceSelector`] turns the quality catalog into an ordered list of
//! playable sources, falling back to a fixed template when the catalog is
//! unavailable or empty. [`SourceSet`] holds the list for one
//! initialization cycle and tracks which entry is active.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::api::{AdmissionApi, QualityCatalog, QualityEntry};
use crate::context::ApiEndpoints;
use crate::protocol_constants::{
    ABR_QUALITY_NAME, FALLBACK_LOW_LATENCY_LABEL, FALLBACK_LOW_LATENCY_PLAYLIST,
    FALLBACK_STANDARD_LABEL, FALLBACK_STANDARD_PLAYLIST,
};
use crate::utils::with_token_param;

/// Errors from source selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The set is empty.
    #[error("No stream sources available")]
    NoSources,

    /// The requested quality is not in the active set.
    #[error("Quality '{0}' is not available")]
    UnknownQuality(String),
}

/// Latency class of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LatencyProfile {
    /// Low-latency HLS.
    LowLatency,
    /// Classic segment-based HLS.
    Standard,
    /// Adaptive bitrate playlist switching between qualities.
    Adaptive,
}

impl LatencyProfile {
    /// Infers the profile from a playlist URI.
    ///
    /// The media server publishes MPEG-TS playlists under a `ts:` prefix;
    /// everything else is LLHLS.
    fn from_uri(uri: &str) -> Self {
        let path = uri.split('?').next().unwrap_or(uri);
        if path.rsplit('/').next().is_some_and(|file| file.starts_with("ts:")) {
            Self::Standard
        } else {
            Self::LowLatency
        }
    }
}

/// One playable source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSource {
    /// Display label.
    pub label: String,
    /// Quality name used for manual selection.
    pub quality: String,
    /// Playlist URI with the stream token attached.
    pub uri: String,
    /// Latency class.
    pub latency_profile: LatencyProfile,
}

/// What to select from a [`SourceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCriterion {
    /// The highest-priority source.
    Default,
    /// The source with this quality name.
    Quality(String),
}

/// Ordered sources for one initialization cycle.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    sources: Vec<StreamSource>,
    active: Option<usize>,
}

impl SourceSet {
    /// Wraps an ordered source list; nothing is active yet.
    #[must_use]
    pub fn new(sources: Vec<StreamSource>) -> Self {
        Self {
            sources,
            active: None,
        }
    }

    /// Selects a source and marks it active.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::UnknownQuality`] if the named quality is not
    /// in the set; the active source is left unchanged.
    pub fn select(&mut self, criterion: &SourceCriterion) -> Result<&StreamSource, SelectionError> {
        let index = match criterion {
            SourceCriterion::Default if self.sources.is_empty() => {
                return Err(SelectionError::NoSources)
            }
            SourceCriterion::Default => 0,
            SourceCriterion::Quality(name) => self
                .sources
                .iter()
                .position(|s| s.quality == *name)
                .ok_or_else(|| SelectionError::UnknownQuality(name.clone()))?,
        };
        self.active = Some(index);
        Ok(&self.sources[index])
    }

    /// The active source.
    #[must_use]
    pub fn active(&self) -> Option<&StreamSource> {
        self.active.and_then(|i| self.sources.get(i))
    }

    /// Quality names in priority order.
    #[must_use]
    pub fn qualities(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.quality.clone()).collect()
    }

    /// All sources in priority order.
    #[must_use]
    pub fn sources(&self) -> &[StreamSource] {
        &self.sources
    }

    /// Returns `true` if the set has no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Resolves playable sources from the quality catalog.
pub struct SourceSelector {
    api: Arc<dyn AdmissionApi>,
    endpoints: ApiEndpoints,
    timeout: Duration,
    include_abr: bool,
}

impl SourceSelector {
    /// Creates a new selector.
    ///
    /// # Arguments
    /// * `api` - Admission API used to fetch the catalog
    /// * `endpoints` - Media base for relative and fallback playlist URIs
    /// * `timeout` - Upper bound on the catalog request
    /// * `include_abr` - Offer the adaptive playlist first when published
    pub fn new(
        api: Arc<dyn AdmissionApi>,
        endpoints: ApiEndpoints,
        timeout: Duration,
        include_abr: bool,
    ) -> Self {
        Self {
            api,
            endpoints,
            timeout,
            include_abr,
        }
    }

    /// Resolves the ordered source list for `stream_token`.
    ///
    /// Never fails and never returns an empty list: catalog errors, timeouts,
    /// and catalogs without active qualities all yield the fallback template.
    pub async fn resolve_sources(&self, stream_token: &str) -> Vec<StreamSource> {
        match tokio::time::timeout(self.timeout, self.api.stream_qualities(stream_token)).await {
            Ok(Ok(catalog)) => {
                let sources = self.from_catalog(&catalog, stream_token);
                if sources.is_empty() {
                    log::info!("[Sources] Catalog has no active qualities, using fallback");
                    self.fallback(stream_token)
                } else {
                    log::info!(
                        "[Sources] Resolved {} source(s): {}",
                        sources.len(),
                        sources
                            .iter()
                            .map(|s| s.quality.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    sources
                }
            }
            Ok(Err(e)) => {
                log::warn!("[Sources] Quality catalog unavailable ({}), using fallback", e);
                self.fallback(stream_token)
            }
            Err(_) => {
                log::warn!("[Sources] Quality catalog timed out, using fallback");
                self.fallback(stream_token)
            }
        }
    }

    fn from_catalog(&self, catalog: &QualityCatalog, stream_token: &str) -> Vec<StreamSource> {
        let mut active: Vec<&QualityEntry> = catalog.qualities.iter().filter(|q| q.active).collect();
        // Stable sort keeps server order among equal priorities.
        active.sort_by_key(|q| q.priority);

        let mut sources = Vec::with_capacity(active.len() + 1);

        if self.include_abr {
            if let Some(abr) = catalog.abr.as_ref().filter(|a| a.active) {
                if let Some(uri) = abr.url.as_deref().and_then(|u| self.playlist_uri(u, stream_token)) {
                    sources.push(StreamSource {
                        label: abr
                            .description
                            .clone()
                            .unwrap_or_else(|| "Automatic".to_string()),
                        quality: ABR_QUALITY_NAME.to_string(),
                        uri,
                        latency_profile: LatencyProfile::Adaptive,
                    });
                }
            }
        }

        for entry in active {
            let Some(uri) = self.entry_uri(entry, stream_token) else {
                log::warn!("[Sources] Skipping quality '{}' without a usable URL", entry.name);
                continue;
            };
            sources.push(StreamSource {
                label: entry.display_name.clone().unwrap_or_else(|| entry.name.clone()),
                quality: entry.name.clone(),
                latency_profile: LatencyProfile::from_uri(&uri),
                uri,
            });
        }

        sources
    }

    /// Playlist URI for a catalog entry: its own URL, or the media server's
    /// `{application}/{stream}/{stream}.m3u8` layout.
    fn entry_uri(&self, entry: &QualityEntry, stream_token: &str) -> Option<String> {
        if let Some(url) = entry.url.as_deref().filter(|u| !u.is_empty()) {
            return self.playlist_uri(url, stream_token);
        }
        let application = entry.application.as_deref()?;
        let stream = entry.stream_name.as_deref()?;
        let path = format!("{}/{}/{}.m3u8", application, stream, stream);
        with_token_param(&self.endpoints.media_url(&path), stream_token)
    }

    fn playlist_uri(&self, url: &str, stream_token: &str) -> Option<String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            with_token_param(url, stream_token)
        } else {
            with_token_param(&self.endpoints.media_url(url), stream_token)
        }
    }

    /// Fixed template: low latency first, then standard.
    fn fallback(&self, stream_token: &str) -> Vec<StreamSource> {
        [
            (FALLBACK_LOW_LATENCY_LABEL, ABR_QUALITY_NAME, FALLBACK_LOW_LATENCY_PLAYLIST, LatencyProfile::LowLatency),
            (FALLBACK_STANDARD_LABEL, "standard", FALLBACK_STANDARD_PLAYLIST, LatencyProfile::Standard),
        ]
        .into_iter()
        .filter_map(|(label, quality, path, profile)| {
            let uri = with_token_param(&self.endpoints.media_url(path), stream_token)?;
            Some(StreamSource {
                label: label.to_string(),
                quality: quality.to_string(),
                uri,
                latency_profile: profile,
            })
        })
        .collect()
    }
}
