use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::filter::{ColumnType, Columns};
use crate::guard::Principal;
use crate::types::{PrincipalId, Role, TenantId};

use super::decode_enum;

pub const USER_COLUMNS: Columns = &[
    ("id", ColumnType::Uuid),
    ("tenant_id", ColumnType::Uuid),
    ("email", ColumnType::Text),
    ("role", ColumnType::Text),
    ("created_at", ColumnType::Timestamp),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: PrincipalId,
    pub tenant_id: TenantId,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.tenant_id, self.role)
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id: Uuid = row.try_get("id")?;
        let tenant_id: Uuid = row.try_get("tenant_id")?;
        Ok(Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: decode_enum(row, "role")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Insert payload. `tenant_id` is always taken from an authorized context,
/// never from request bodies.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// First admin of a tenant that is being provisioned; the tenant id is
/// assigned by the store in the same write.
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub email: String,
    pub password_hash: String,
}
