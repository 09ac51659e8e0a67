use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::config;
use crate::database::models::{NewNote, Note, NoteChanges};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::guard::{AccessRequest, Principal, RecordRef, Usage};
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::{NoteId, OperationKind};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order: Option<String>,
}

impl From<ListQuery> for FilterData {
    fn from(query: ListQuery) -> Self {
        FilterData {
            where_clause: None,
            order: Some(serde_json::Value::String(query.order.unwrap_or_else(|| "created_at desc".to_string()))),
            limit: Some(query.limit.unwrap_or(config::config().filter.default_limit)),
            offset: query.offset,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// GET /api/notes - newest first, paged with `limit`/`offset`
pub async fn notes_list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Note>> {
    find(&state, &principal, query.into()).await
}

/// POST /api/notes/find - filtered list, body is a filter descriptor
pub async fn notes_find(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(filter_data): Json<FilterData>,
) -> ApiResult<Vec<Note>> {
    find(&state, &principal, filter_data).await
}

async fn find(state: &AppState, principal: &Principal, mut filter_data: FilterData) -> ApiResult<Vec<Note>> {
    if filter_data.limit.is_none() {
        filter_data.limit = Some(config::config().filter.default_limit);
    }

    state
        .guard
        .authorize(principal, &AccessRequest::new(OperationKind::List))?
        .into_result()?;

    let query = state.guard.scope_query(principal, filter_data);
    Ok(ApiResponse::success(state.store.list_notes(&query).await?))
}

/// POST /api/notes - create in the caller's tenant, subject to the plan limit
pub async fn note_create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateNote>,
) -> ApiResult<Note> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Note title is required"));
    }

    let tenant = state
        .store
        .find_tenant(principal.tenant_id())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Tenant no longer exists"))?;
    let count = state.store.count_notes(tenant.id).await?;

    let request = AccessRequest::new(OperationKind::Create).with_usage(Usage::new(count, tenant.note_limit()));
    state.guard.authorize(&principal, &request)?.into_result()?;

    // The store re-checks the limit atomically; a concurrent create that
    // slipped past the check above still fails with the same denial.
    let note = state
        .store
        .insert_note(NewNote {
            tenant_id: principal.tenant_id(),
            author_id: principal.id(),
            title: title.to_string(),
            content: body.content,
        })
        .await?;

    tracing::info!(note = %note.id, tenant = %note.tenant_id, author = %note.author_id, "Created note");
    Ok(ApiResponse::created(note))
}

/// GET /api/notes/:id
pub async fn note_get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Note> {
    let record = authorize_record(&state, &principal, OperationKind::Read, id.into()).await?;

    let query = state.guard.scope_query(&principal, FilterData::default());
    let note = state.store.get_note(&query, record.id).await?.ok_or_else(|| not_found(record.id))?;
    Ok(ApiResponse::success(note))
}

/// PUT /api/notes/:id - partial update of title and/or content
pub async fn note_update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(changes): Json<NoteChanges>,
) -> ApiResult<Note> {
    if changes.is_empty() {
        return Err(ApiError::bad_request("Nothing to update"));
    }
    if changes.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("Note title cannot be empty"));
    }

    let record = authorize_record(&state, &principal, OperationKind::Update, id.into()).await?;

    let query = state.guard.scope_query(&principal, FilterData::default());
    let note = state
        .store
        .update_note(&query, record.id, changes)
        .await?
        .ok_or_else(|| not_found(record.id))?;
    Ok(ApiResponse::success(note))
}

/// DELETE /api/notes/:id - own notes for members, any note for admins
pub async fn note_delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let record = authorize_record(&state, &principal, OperationKind::Delete, id.into()).await?;

    let query = state.guard.scope_query(&principal, FilterData::default());
    if !state.store.delete_note(&query, record.id).await? {
        return Err(not_found(record.id));
    }

    tracing::info!(note = %record.id, by = %principal.id(), "Deleted note");
    Ok(ApiResponse::no_content())
}

/// Resolve ownership of one note and ask the guard about it
async fn authorize_record(
    state: &AppState,
    principal: &Principal,
    operation: OperationKind,
    id: NoteId,
) -> Result<RecordRef, ApiError> {
    let record = state.store.locate_note(id).await?.ok_or_else(|| not_found(id))?;

    let request = AccessRequest::new(operation).on_record(record);
    state.guard.authorize(principal, &request)?.into_result()?;
    Ok(record)
}

fn not_found(id: NoteId) -> ApiError {
    ApiError::not_found(format!("Note {} not found", id))
}
