use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::filter::FilterError;
use crate::guard::{RecordRef, ScopedQuery};
use crate::types::{NoteId, PlanTier, PrincipalId, TenantId};

use super::models::{NewAdmin, NewNote, NewTenant, NewUser, Note, NoteChanges, Tenant, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Plan limit of {limit} notes reached")]
    PlanLimitReached { limit: u64 },

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Invalid query: {0}")]
    Query(#[from] FilterError),

    #[error(transparent)]
    Database(#[from] super::manager::DatabaseError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique constraint").to_string())
            }
            _ => StoreError::Database(err.into()),
        }
    }
}

pub type StoreRef = Arc<dyn Store>;

/// Persistence boundary.
///
/// Tenant-owned rows are only reachable through a [`ScopedQuery`], so every
/// read, update and delete carries the caller's tenant constraint. The
/// single unscoped record lookup, [`Store::locate_note`], returns ownership
/// facts for the access guard and never content.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;
    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError>;
    /// Create a tenant together with its first admin. Either both rows are
    /// written or neither is.
    async fn provision_tenant(&self, tenant: NewTenant, admin: NewAdmin) -> Result<(Tenant, User), StoreError>;
    async fn set_tenant_plan(&self, id: TenantId, plan: PlanTier) -> Result<Tenant, StoreError>;

    /// Login lookup; emails are unique across tenants
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user(&self, id: PrincipalId) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn list_users(&self, query: &ScopedQuery) -> Result<Vec<User>, StoreError>;

    async fn locate_note(&self, id: NoteId) -> Result<Option<RecordRef>, StoreError>;
    async fn count_notes(&self, tenant_id: TenantId) -> Result<u64, StoreError>;
    async fn list_notes(&self, query: &ScopedQuery) -> Result<Vec<Note>, StoreError>;
    async fn get_note(&self, query: &ScopedQuery, id: NoteId) -> Result<Option<Note>, StoreError>;

    /// Insert if the tenant is below its plan's note limit, with the plan read,
    /// count and write performed atomically. This is the authoritative
    /// plan-limit enforcement; the guard's check is only a fast reject.
    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError>;
    async fn update_note(&self, query: &ScopedQuery, id: NoteId, changes: NoteChanges)
        -> Result<Option<Note>, StoreError>;
    async fn delete_note(&self, query: &ScopedQuery, id: NoteId) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
