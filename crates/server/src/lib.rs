// crates/server/src/lib.rs
//! Statboard server library.
//!
//! Runs the dashboard aggregation pipeline behind an Axum API: the
//! `RequestCoordinator` fans out to the backend sources, and the routes hand
//! the resulting view-state to the client.

pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod state;

pub use coordinator::{Phase, RefreshOutcome, RefreshTrigger, RequestCoordinator};
pub use error::*;
pub use fetcher::{http_fetchers, HttpSourceFetcher, SourceFetcher};
pub use identity::{IdentityProvider, SessionIdentity};
pub use crate::metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
