use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};

use super::{
    dto::{
        ChangePasswordRequest, MessageResponse, ProfilePictureResponse, PublicUser,
        RegisterRequest, RoleRequest,
    },
    services::UploadItem,
};
use crate::{
    error::{AccountError, ValidJson},
    state::AppState,
};

/// Multipart field carrying the picture.
const PICTURE_FIELD: &str = "profile_picture";
const PICTURE_BODY_LIMIT: usize = 10 * 1024 * 1024; // 10MB

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user).delete(delete_user))
        .route("/api/users/:id/role", put(update_role))
        .route("/api/users/:id/change_password", put(change_password))
        .route("/users/:id", put(update_user))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/user/:id/profile_picture", post(upload_profile_picture))
        .layer(DefaultBodyLimit::max(PICTURE_BODY_LIMIT))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.register(payload).await?;
    Ok(Json(MessageResponse::new("user created successfully")))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicUser>>, AccountError> {
    Ok(Json(state.accounts.list().await?))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AccountError> {
    Ok(Json(state.accounts.get(&id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<RoleRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.update_role(&id, &payload.role).await?;
    Ok(Json(MessageResponse::new("role updated successfully")))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<Value>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.update(&id, payload).await?;
    Ok(Json(MessageResponse::new("user updated successfully")))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.change_password(&id, payload).await?;
    Ok(Json(MessageResponse::new("password updated successfully")))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.delete(&id).await?;
    Ok(Json(MessageResponse::new("user deleted successfully")))
}

#[instrument(skip(state, mp))]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProfilePictureResponse>, AccountError> {
    let mut mp = mp.map_err(|e| AccountError::bad_request(e.body_text()))?;

    let mut item = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| AccountError::bad_request("invalid multipart body"))?
    {
        if field.name() != Some(PICTURE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|_| AccountError::bad_request("could not read the uploaded file"))?;
        item = Some(UploadItem { body, content_type });
        break;
    }
    let item = item.ok_or_else(|| {
        AccountError::bad_request(format!("multipart field `{PICTURE_FIELD}` is required"))
    })?;

    info!(bytes = item.body.len(), "profile picture received");
    let profile_picture = state.accounts.upload_picture(&id, item).await?;
    Ok(Json(ProfilePictureResponse {
        message: "profile picture uploaded successfully".into(),
        profile_picture,
    }))
}
