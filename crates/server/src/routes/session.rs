// crates/server/src/routes/session.rs
//! Sign-in/sign-out hand-off from the external identity provider.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::identity::IdentityProvider;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub identity_id: String,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub identity_id: String,
}

/// POST /api/session - Record the identity and bearer token the provider issued.
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let identity_id = req.identity_id.trim();
    if identity_id.is_empty() {
        return Err(ApiError::BadRequest("identityId must not be empty".into()));
    }
    if req.access_token.trim().is_empty() {
        return Err(ApiError::BadRequest("accessToken must not be empty".into()));
    }

    if let Some(previous) = state.session.current_identity().filter(|p| p != identity_id) {
        tracing::info!(previous = %previous, "Switching identity; leaving previous dashboard");
        state.coordinator.unmount();
    }
    state.session.sign_in(identity_id, req.access_token.trim());
    tracing::info!(identity_id, "Signed in");

    Ok(Json(SessionResponse {
        identity_id: identity_id.to_string(),
    }))
}

/// DELETE /api/session - Explicit sign-out; forgets that identity's cached dashboard.
pub async fn sign_out(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    let identity_id = state.require_identity()?;
    state.session.clear();
    state.coordinator.sign_out(&identity_id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/session", post(sign_in).delete(sign_out))
}
