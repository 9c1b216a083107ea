//! Registration and login handlers.

use crate::auth::{hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use stash_core::content::{CredentialsRequest, LoginResponse};
use stash_metadata::UserRepo as _;
use time::OffsetDateTime;

/// POST /api/v1/auth/register - create an account.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<Value>> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .metadata
        .create_user(req.username.trim(), &password_hash, OffsetDateTime::now_utc())
        .await?;

    tracing::info!(user_id = user.user_id, username = %user.username, "user registered");
    Ok(Json(json!({})))
}

/// POST /api/v1/auth/login - exchange credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<LoginResponse>> {
    // A missing user and a bad password produce the same answer so usernames
    // cannot be enumerated.
    let invalid = || ApiError::Unauthorized("invalid username or password".to_string());

    let user = state
        .metadata
        .get_user_by_username(req.username.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.user_id, &user.username)?;
    Ok(Json(LoginResponse { token }))
}
