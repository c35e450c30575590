// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use statboard_core::DashboardConfig;
use statboard_db::{open_kv, CacheStore, DbError, DbResult};

use crate::coordinator::RequestCoordinator;
use crate::error::{ApiError, ApiResult};
use crate::fetcher::{http_fetchers, SourceFetcher};
use crate::identity::{IdentityProvider, SessionIdentity};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Stand-in for the external identity provider.
    pub session: Arc<SessionIdentity>,
    pub coordinator: Arc<RequestCoordinator>,
}

impl AppState {
    /// Wire a coordinator around `fetchers` and `cache`, sharing one session slot.
    pub fn new(
        config: &DashboardConfig,
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        cache: CacheStore,
        session: Arc<SessionIdentity>,
    ) -> Arc<Self> {
        let coordinator = RequestCoordinator::new(config, fetchers, cache, session.clone(), session.clone());
        Arc::new(Self {
            start_time: Instant::now(),
            session,
            coordinator: Arc::new(coordinator),
        })
    }

    /// Production wiring: HTTP fetchers and the configured cache backend.
    pub async fn from_config(config: &DashboardConfig) -> DbResult<Arc<Self>> {
        let location = config.cache_location().ok_or(DbError::NoDataDir)?;
        let cache = CacheStore::new(open_kv(&location).await?);
        let session = Arc::new(SessionIdentity::new());
        let fetchers = http_fetchers(config, reqwest::Client::new(), session.clone());
        Ok(Self::new(config, fetchers, cache, session))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// The signed-in identity, or 401.
    pub fn require_identity(&self) -> ApiResult<String> {
        self.session.current_identity().ok_or(ApiError::Unauthenticated)
    }
}
