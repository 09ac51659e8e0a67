use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::config;
use crate::database::models::User;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub expires_in: u64,
}

/// POST /auth/login - exchange credentials for a bearer token
pub async fn login_post(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<LoginResponse> {
    // Same response for unknown email and wrong password
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = state.store.find_user_by_email(body.email.trim()).await?.ok_or_else(invalid)?;
    if !auth::verify_password(&body.password, &user.password_hash)? {
        tracing::info!(user = %user.id, "Rejected login");
        return Err(invalid());
    }

    let token = auth::issue_token(&user.principal())?;
    tracing::info!(user = %user.id, tenant = %user.tenant_id, "User logged in");

    Ok(ApiResponse::success(LoginResponse {
        token,
        user,
        expires_in: config::config().security.jwt_expiry_hours * 3600,
    }))
}
