use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::types::{PlanTier, TenantId};

use super::decode_enum;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn note_limit(&self) -> Option<u64> {
        self.plan.note_limit()
    }
}

impl<'r> FromRow<'r, PgRow> for Tenant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id: Uuid = row.try_get("id")?;
        Ok(Self {
            id: id.into(),
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            plan: decode_enum(row, "plan")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
    pub slug: String,
    pub name: String,
    #[serde(default = "default_plan")]
    pub plan: PlanTier,
}

fn default_plan() -> PlanTier {
    PlanTier::Free
}
