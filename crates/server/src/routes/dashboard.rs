// crates/server/src/routes/dashboard.rs
//! Dashboard view-state endpoints.
//!
//! Handlers never render anything: they hand the current `DashboardView` to
//! the client by value and translate visits into coordinator calls.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use statboard_types::DashboardView;

use crate::coordinator::{RefreshOutcome, RefreshTrigger};
use crate::error::ApiResult;
use crate::metrics::RequestTimer;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub outcome: RefreshOutcome,
    pub view: DashboardView,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub supersede: bool,
}

/// The view only ever leaves the server for the identity it belongs to.
fn view_for(state: &AppState, identity_id: &str) -> DashboardView {
    let view = state.coordinator.view();
    if view.identity_id.as_deref() == Some(identity_id) {
        view
    } else {
        DashboardView::for_identity(identity_id)
    }
}

fn timed<T>(timer: RequestTimer, result: ApiResult<T>) -> ApiResult<T> {
    match &result {
        Ok(_) => timer.finish_ok(),
        Err(e) => timer.finish_err(e.status().as_u16()),
    }
    result
}

/// GET /api/dashboard - Current view-state.
pub async fn get_dashboard(State(state): State<Arc<AppState>>) -> ApiResult<Json<DashboardView>> {
    let timer = RequestTimer::new("dashboard_get");
    let result = state
        .require_identity()
        .map(|identity_id| Json(view_for(&state, &identity_id)));
    timed(timer, result)
}

/// POST /api/dashboard/mount - Hydrate from cache, then run the initial load.
pub async fn mount_dashboard(State(state): State<Arc<AppState>>) -> ApiResult<Json<RefreshResponse>> {
    let timer = RequestTimer::new("dashboard_mount");
    let identity_id = match state.require_identity() {
        Ok(id) => id,
        Err(e) => return timed(timer, Err(e)),
    };

    state.coordinator.mount(&identity_id).await;
    let outcome = state
        .coordinator
        .refresh(&identity_id, RefreshTrigger::initial())
        .await;

    timed(
        timer,
        Ok(Json(RefreshResponse {
            outcome,
            view: view_for(&state, &identity_id),
        })),
    )
}

/// POST /api/dashboard/refresh?supersede=bool
pub async fn refresh_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
) -> ApiResult<Json<RefreshResponse>> {
    let timer = RequestTimer::new("dashboard_refresh");
    let identity_id = match state.require_identity() {
        Ok(id) => id,
        Err(e) => return timed(timer, Err(e)),
    };

    let trigger = RefreshTrigger {
        is_initial_load: false,
        supersede: params.supersede,
    };
    let outcome = state.coordinator.refresh(&identity_id, trigger).await;

    timed(
        timer,
        Ok(Json(RefreshResponse {
            outcome,
            view: view_for(&state, &identity_id),
        })),
    )
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/mount", post(mount_dashboard))
        .route("/dashboard/refresh", post(refresh_dashboard))
}
