//! HTTP implementation of the admission API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::{
    AdmissionApi, ApiError, ApiResult, CredentialProvider, IssuedToken, QualityCatalog,
    StatusPayload,
};
use crate::context::ApiEndpoints;

/// Production [`AdmissionApi`] backed by a shared `reqwest` client.
///
/// Every request carries its own timeout; a timeout is reported as
/// [`ApiError::Timeout`] and treated like any other network failure.
pub struct HttpAdmissionApi {
    client: Client,
    endpoints: ApiEndpoints,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl HttpAdmissionApi {
    /// Creates a new admission API client.
    pub fn new(
        client: Client,
        endpoints: ApiEndpoints,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
            timeout,
        }
    }

    /// Sends an authenticated GET and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, label: &str, url: &str, bearer: &str) -> ApiResult<T> {
        let start = Instant::now();
        let res = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await;

        log::debug!(
            "[AdmissionApi] {} completed in {:?}: {:?}",
            label,
            start.elapsed(),
            res.as_ref().map(|r| r.status())
        );

        let res = res.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Http(e)
            }
        })?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::HttpStatus(status.as_u16(), body));
        }

        let body = res.bytes().await?;
        serde_json::from_slice::<T>(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AdmissionApi for HttpAdmissionApi {
    async fn issue_stream_token(&self) -> ApiResult<Option<IssuedToken>> {
        let Some(credential) = self.credentials.bearer() else {
            log::debug!("[AdmissionApi] No user credential, skipping token issuance");
            return Ok(None);
        };

        let issued: IssuedToken = self
            .get_json("token", &self.endpoints.token_url(), &credential)
            .await?;

        if issued.stream_token.is_empty() {
            return Err(ApiError::Decode("empty streamToken".to_string()));
        }

        log::info!(
            "[AdmissionApi] Stream token issued (expires in {}s)",
            issued.expires_in
        );
        Ok(Some(issued))
    }

    async fn stream_status(&self, stream_token: &str) -> ApiResult<StatusPayload> {
        self.get_json("status", &self.endpoints.status_url(), stream_token)
            .await
    }

    async fn stream_qualities(&self, stream_token: &str) -> ApiResult<QualityCatalog> {
        self.get_json("qualities", &self.endpoints.qualities_url(), stream_token)
            .await
    }
}
