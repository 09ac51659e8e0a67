use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::Tenant;
use crate::error::ApiError;
use crate::guard::{AccessRequest, Principal, Usage};
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::{OperationKind, PlanTier, TenantId};

#[derive(Debug, Serialize)]
pub struct TenantView {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    #[serde(default = "pro")]
    pub plan: PlanTier,
}

fn pro() -> PlanTier {
    PlanTier::Pro
}

/// GET /api/tenants/:id - tenant details with note usage
pub async fn tenant_get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<TenantView> {
    let tenant_id = TenantId::from(id);
    let request = AccessRequest::new(OperationKind::Read).on_tenant(tenant_id);
    state.guard.authorize(&principal, &request)?.into_result()?;

    let tenant = state
        .store
        .find_tenant(tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tenant {} not found", tenant_id)))?;
    let usage = Usage::new(state.store.count_notes(tenant.id).await?, tenant.note_limit());

    Ok(ApiResponse::success(TenantView { tenant, usage }))
}

/// POST /api/tenants/:id/upgrade - change plan (admins of that tenant only)
pub async fn tenant_upgrade(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpgradeRequest>,
) -> ApiResult<Tenant> {
    let tenant = state.tenants.upgrade(&principal, id.into(), body.plan).await?;
    Ok(ApiResponse::success(tenant))
}
