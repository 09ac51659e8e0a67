use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::filter::{ColumnType, Columns};
use crate::guard::RecordRef;
use crate::types::{NoteId, PrincipalId, TenantId};

/// Columns callers may filter and order on
pub const NOTE_COLUMNS: Columns = &[
    ("id", ColumnType::Uuid),
    ("author_id", ColumnType::Uuid),
    ("title", ColumnType::Text),
    ("content", ColumnType::Text),
    ("created_at", ColumnType::Timestamp),
    ("updated_at", ColumnType::Timestamp),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub tenant_id: TenantId,
    pub author_id: PrincipalId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn record_ref(&self) -> RecordRef {
        RecordRef { id: self.id, tenant_id: self.tenant_id, owner_id: self.author_id }
    }
}

impl<'r> FromRow<'r, PgRow> for Note {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id: Uuid = row.try_get("id")?;
        let tenant_id: Uuid = row.try_get("tenant_id")?;
        let author_id: Uuid = row.try_get("author_id")?;
        Ok(Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            author_id: author_id.into(),
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Insert payload; tenant and author come from the authorized principal
#[derive(Debug, Clone)]
pub struct NewNote {
    pub tenant_id: TenantId,
    pub author_id: PrincipalId,
    pub title: String,
    pub content: String,
}

/// Mutable fields only. Ownership columns are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NoteChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    pub fn apply(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
    }
}
