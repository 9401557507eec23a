use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::dto::{LoginRequest, LoginResponse},
    error::{AccountError, ValidJson},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AccountError> {
    let out = state
        .accounts
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(LoginResponse {
        token: out.token,
        user: out.user,
    }))
}
