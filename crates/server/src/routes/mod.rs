//! API route handlers for the statboard server.

pub mod dashboard;
pub mod health;
pub mod metrics;
pub mod session;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Combined router.
///
/// Routes:
/// - GET    /api/health - Health check
/// - GET    /api/dashboard - Current view-state for the signed-in identity
/// - POST   /api/dashboard/mount - Cache hydration plus initial load
/// - POST   /api/dashboard/refresh - Refresh (`?supersede=true` cancels an in-flight run)
/// - POST   /api/session - Sign in with an identity id and access token
/// - DELETE /api/session - Sign out and clear that identity's cache
/// - GET    /metrics - Prometheus text
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", dashboard::router())
        .nest("/api", session::router())
        .merge(metrics::router())
        .with_state(state)
}
