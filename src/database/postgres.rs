use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{postgres::PgArguments, FromRow, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::filter::{ColumnType, FilterError, SqlResult};
use crate::guard::{RecordRef, ScopedQuery};
use crate::types::{NoteId, PlanTier, PrincipalId, Role, TenantId};

use super::manager::DatabaseManager;
use super::models::{NewAdmin, NewNote, NewTenant, NewUser, Note, NoteChanges, Tenant, User, NOTE_COLUMNS, USER_COLUMNS};
use super::store::{Store, StoreError};

/// PostgreSQL-backed store (shared schema, `tenant_id` on every owned row)
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(manager: &DatabaseManager) -> Self {
        Self { pool: manager.pool().clone() }
    }

    async fn fetch_scoped<T>(&self, sql: SqlResult) -> Result<Vec<T>, StoreError>
    where
        T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let mut q = sqlx::query_as::<_, T>(&sql.query);
        for value in bind_values(&sql)? {
            q = bind_param_query_as(q, value);
        }
        Ok(q.fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn provision_tenant(&self, tenant: NewTenant, admin: NewAdmin) -> Result<(Tenant, User), StoreError> {
        // Dropping the transaction on any error rolls the tenant row back
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (id, slug, name, plan) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .bind(tenant.plan.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let admin = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, tenant_id, email, password_hash, role) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(created.id.0)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(Role::Admin.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created, admin))
    }

    async fn set_tenant_plan(&self, id: TenantId, plan: PlanTier) -> Result<Tenant, StoreError> {
        sqlx::query_as::<_, Tenant>("UPDATE tenants SET plan = $2, updated_at = now() WHERE id = $1 RETURNING *")
            .bind(id.0)
            .bind(plan.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", id)))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user(&self, id: PrincipalId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let created = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, tenant_id, email, password_hash, role) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user.tenant_id.0)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_users(&self, query: &ScopedQuery) -> Result<Vec<User>, StoreError> {
        self.fetch_scoped(query.to_sql("users", USER_COLUMNS)?).await
    }

    async fn locate_note(&self, id: NoteId) -> Result<Option<RecordRef>, StoreError> {
        let row = sqlx::query("SELECT id, tenant_id, author_id FROM notes WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<RecordRef, sqlx::Error> {
            let id: Uuid = r.try_get("id")?;
            let tenant_id: Uuid = r.try_get("tenant_id")?;
            let owner_id: Uuid = r.try_get("author_id")?;
            Ok(RecordRef { id: id.into(), tenant_id: tenant_id.into(), owner_id: owner_id.into() })
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn count_notes(&self, tenant_id: TenantId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE tenant_id = $1")
            .bind(tenant_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_notes(&self, query: &ScopedQuery) -> Result<Vec<Note>, StoreError> {
        self.fetch_scoped(query.to_sql("notes", NOTE_COLUMNS)?).await
    }

    async fn get_note(&self, query: &ScopedQuery, id: NoteId) -> Result<Option<Note>, StoreError> {
        let narrowed = query.clone().and_where(json!({ "id": id }));
        let mut notes: Vec<Note> = self.fetch_scoped(narrowed.to_sql("notes", NOTE_COLUMNS)?).await?;
        Ok(notes.pop())
    }

    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent inserts for one tenant
        let plan: String = sqlx::query_scalar("SELECT plan FROM tenants WHERE id = $1 FOR UPDATE")
            .bind(note.tenant_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", note.tenant_id)))?;
        let plan: PlanTier = plan
            .parse()
            .map_err(|e: crate::guard::GuardError| StoreError::InvalidData(e.to_string()))?;

        if let Some(limit) = plan.note_limit() {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE tenant_id = $1")
                .bind(note.tenant_id.0)
                .fetch_one(&mut *tx)
                .await?;
            if count.max(0) as u64 >= limit {
                return Err(StoreError::PlanLimitReached { limit });
            }
        }

        let created = sqlx::query_as::<_, Note>(
            "INSERT INTO notes (id, tenant_id, author_id, title, content) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(note.tenant_id.0)
        .bind(note.author_id.0)
        .bind(&note.title)
        .bind(&note.content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_note(
        &self,
        query: &ScopedQuery,
        id: NoteId,
        changes: NoteChanges,
    ) -> Result<Option<Note>, StoreError> {
        let narrowed = query.clone().and_where(json!({ "id": id }));
        let where_sql = narrowed.compile("notes", NOTE_COLUMNS)?.to_where_sql();
        let next = where_sql.params.len();

        let sql = format!(
            "UPDATE notes SET title = COALESCE(${}, title), content = COALESCE(${}, content), updated_at = now() \
             WHERE {} RETURNING *",
            next + 1,
            next + 2,
            where_sql.query
        );

        let mut q = sqlx::query_as::<_, Note>(&sql);
        for value in bind_values(&where_sql)? {
            q = bind_param_query_as(q, value);
        }
        let updated = q
            .bind(changes.title)
            .bind(changes.content)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn delete_note(&self, query: &ScopedQuery, id: NoteId) -> Result<bool, StoreError> {
        let narrowed = query.clone().and_where(json!({ "id": id }));
        let where_sql = narrowed.compile("notes", NOTE_COLUMNS)?.to_where_sql();

        let sql = format!("DELETE FROM notes WHERE {}", where_sql.query);
        let mut q = sqlx::query(&sql);
        for value in bind_values(&where_sql)? {
            q = bind_param_query(q, value);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// JSON parameter bound as the SQL type of the column it is compared
/// against. The value's shape never decides: a UUID-looking title is still
/// text.
#[derive(Debug, PartialEq)]
enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Text(String),
    Json(Value),
}

impl BindValue {
    fn classify(column_type: Option<ColumnType>, v: &Value) -> Result<Self, FilterError> {
        match (column_type, v) {
            (_, Value::Null) => Ok(BindValue::Null),
            (Some(ColumnType::Text), Value::String(s)) => Ok(BindValue::Text(s.clone())),
            (Some(ColumnType::Text), Value::Number(_) | Value::Bool(_)) => Ok(BindValue::Text(v.to_string())),
            (Some(ColumnType::Uuid), Value::String(s)) => Uuid::parse_str(s)
                .map(BindValue::Uuid)
                .map_err(|_| FilterError::InvalidOperatorData(format!("'{}' is not a valid UUID", s))),
            (Some(ColumnType::Timestamp), Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|ts| BindValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| FilterError::InvalidOperatorData(format!("'{}' is not an RFC 3339 timestamp", s))),
            (Some(ty), _) => Err(FilterError::InvalidOperatorData(format!("{} cannot be compared with a {:?} column", v, ty))),
            (None, _) => Ok(Self::from_json(v)),
        }
    }

    /// Untyped columns: bind by JSON shape, strings as text
    fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    // Postgres has no u64
                    BindValue::Int(u.min(i64::MAX as u64) as i64)
                } else {
                    BindValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => BindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Json(v.clone()),
        }
    }
}

fn bind_values(sql: &SqlResult) -> Result<Vec<BindValue>, StoreError> {
    sql.params
        .iter()
        .enumerate()
        .map(|(i, v)| BindValue::classify(sql.param_types.get(i).copied().flatten(), v))
        .collect::<Result<Vec<_>, FilterError>>()
        .map_err(StoreError::from)
}

fn bind_param_query(
    q: sqlx::query::Query<'_, Postgres, PgArguments>,
    v: BindValue,
) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    match v {
        BindValue::Null => q.bind(Option::<String>::None),
        BindValue::Bool(b) => q.bind(b),
        BindValue::Int(i) => q.bind(i),
        BindValue::Float(f) => q.bind(f),
        BindValue::Uuid(id) => q.bind(id),
        BindValue::Timestamp(ts) => q.bind(ts),
        BindValue::Text(s) => q.bind(s),
        BindValue::Json(j) => q.bind(j),
    }
}

fn bind_param_query_as<O>(
    q: sqlx::query::QueryAs<'_, Postgres, O, PgArguments>,
    v: BindValue,
) -> sqlx::query::QueryAs<'_, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
{
    match v {
        BindValue::Null => q.bind(Option::<String>::None),
        BindValue::Bool(b) => q.bind(b),
        BindValue::Int(i) => q.bind(i),
        BindValue::Float(f) => q.bind(f),
        BindValue::Uuid(id) => q.bind(id),
        BindValue::Timestamp(ts) => q.bind(ts),
        BindValue::Text(s) => q.bind(s),
        BindValue::Json(j) => q.bind(j),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterData;
    use crate::guard::{Principal, TenantGuard};

    #[test]
    fn binds_by_column_type_not_value_shape() {
        let id = Uuid::new_v4();
        let text = Some(ColumnType::Text);

        assert_eq!(BindValue::classify(text, &json!(id)).unwrap(), BindValue::Text(id.to_string()));
        assert_eq!(
            BindValue::classify(text, &json!("2024-05-01T10:00:00Z")).unwrap(),
            BindValue::Text("2024-05-01T10:00:00Z".to_string())
        );
        assert_eq!(BindValue::classify(text, &json!(7)).unwrap(), BindValue::Text("7".to_string()));
        assert_eq!(BindValue::classify(Some(ColumnType::Uuid), &json!(id)).unwrap(), BindValue::Uuid(id));
        assert!(matches!(
            BindValue::classify(Some(ColumnType::Timestamp), &json!("2024-05-01T10:00:00Z")),
            Ok(BindValue::Timestamp(_))
        ));
        assert_eq!(BindValue::classify(Some(ColumnType::Uuid), &Value::Null).unwrap(), BindValue::Null);
        assert_eq!(BindValue::classify(None, &json!(1.5)).unwrap(), BindValue::Float(1.5));
        assert_eq!(BindValue::classify(None, &json!(id)).unwrap(), BindValue::Text(id.to_string()));
    }

    #[test]
    fn values_that_do_not_fit_the_column_are_rejected() {
        assert!(BindValue::classify(Some(ColumnType::Uuid), &json!("not-a-uuid")).is_err());
        assert!(BindValue::classify(Some(ColumnType::Timestamp), &json!("yesterday")).is_err());
        assert!(BindValue::classify(Some(ColumnType::Uuid), &json!(5)).is_err());
    }

    #[test]
    fn uuid_shaped_title_search_binds_as_text() {
        let principal = Principal::new(PrincipalId::new_v4(), TenantId::new_v4(), Role::Member);
        let lookalike = Uuid::new_v4().to_string();
        let query = TenantGuard::default().scope_query(&principal, FilterData::where_eq("title", lookalike.clone()));

        let sql = query.to_sql("notes", NOTE_COLUMNS).unwrap();
        let binds = bind_values(&sql).unwrap();
        assert_eq!(binds[0], BindValue::Uuid(principal.tenant_id().0));
        assert_eq!(binds[1], BindValue::Text(lookalike));
    }
}
