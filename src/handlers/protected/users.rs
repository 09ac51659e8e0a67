use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::database::models::User;
use crate::filter::FilterData;
use crate::guard::{AccessRequest, Principal};
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::{OperationKind, Role};

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "member")]
    pub role: Role,
}

fn member() -> Role {
    Role::Member
}

/// GET /api/users - users of the caller's tenant
pub async fn users_list(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResult<Vec<User>> {
    state
        .guard
        .authorize(&principal, &AccessRequest::new(OperationKind::List))?
        .into_result()?;

    let query = state.guard.scope_query(&principal, FilterData::default());
    Ok(ApiResponse::success(state.store.list_users(&query).await?))
}

/// POST /api/users/invite - admins add users to their own tenant
pub async fn user_invite(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<InviteRequest>,
) -> ApiResult<User> {
    let user = state
        .tenants
        .invite(&principal, body.email.trim(), &body.password, body.role)
        .await?;
    Ok(ApiResponse::created(user))
}
