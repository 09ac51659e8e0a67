use axum::{extract::State, Extension};
use serde::Serialize;

use crate::database::models::{Tenant, User};
use crate::error::ApiError;
use crate::guard::Principal;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct Whoami {
    pub principal: Principal,
    pub user: User,
    pub tenant: Tenant,
}

/// GET /api/auth/whoami - the authenticated caller, their user and tenant
pub async fn whoami_get(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResult<Whoami> {
    let user = state
        .store
        .find_user(principal.id())
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;
    let tenant = state
        .store
        .find_tenant(principal.tenant_id())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Tenant no longer exists"))?;

    Ok(ApiResponse::success(Whoami { principal, user, tenant }))
}
