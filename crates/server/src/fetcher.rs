// crates/server/src/fetcher.rs
//! One fetcher per backend source.
//!
//! A fetcher reports its own failure as a `FetchError`; it never retries and
//! never affects the other sources of the same run.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use statboard_core::{payload::check_envelope, DashboardConfig, FetchError};
use statboard_types::SourceKind;
use tokio_util::sync::CancellationToken;

use crate::identity::IdentityProvider;

/// Header carrying the identity the request is made for.
pub const IDENTITY_HEADER: &str = "X-Identity-Id";

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Fetch the raw payload for `identity_id`. Must return
    /// `FetchError::Cancelled` promptly once `cancel` fires.
    async fn fetch(&self, identity_id: &str, cancel: &CancellationToken) -> Result<Value, FetchError>;
}

/// `GET {api_base_url}{path}` with the bearer token of the identity the
/// request is made for.
pub struct HttpSourceFetcher {
    source: SourceKind,
    url: String,
    client: reqwest::Client,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpSourceFetcher {
    pub fn new(
        source: SourceKind,
        url: impl Into<String>,
        client: reqwest::Client,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            source,
            url: url.into(),
            client,
            identity,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, identity_id: &str) -> Result<Value, FetchError> {
        // The session moved on to another identity: this run is stale.
        let Some(token) = self.identity.access_token_for(identity_id) else {
            tracing::debug!(source = %self.source, identity_id, "No session for this identity; not fetching");
            return Err(FetchError::Cancelled);
        };

        let resp = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .header(IDENTITY_HEADER, identity_id)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        check_envelope(body)
    }
}

impl std::fmt::Debug for HttpSourceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSourceFetcher")
            .field("source", &self.source)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    fn source(&self) -> SourceKind {
        self.source
    }

    async fn fetch(&self, identity_id: &str, cancel: &CancellationToken) -> Result<Value, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.request(identity_id) => result,
        }
    }
}

/// One HTTP fetcher per source, all sharing `client`.
pub fn http_fetchers(
    config: &DashboardConfig,
    client: reqwest::Client,
    identity: Arc<dyn IdentityProvider>,
) -> Vec<Arc<dyn SourceFetcher>> {
    SourceKind::ALL
        .iter()
        .map(|&source| {
            Arc::new(HttpSourceFetcher::new(
                source,
                config.source_url(source),
                client.clone(),
                identity.clone(),
            )) as Arc<dyn SourceFetcher>
        })
        .collect()
}
