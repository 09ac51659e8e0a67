use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::filter::Filter;
use crate::guard::{RecordRef, ScopedQuery};
use crate::types::{NoteId, PlanTier, PrincipalId, Role, TenantId};

use super::models::{NewAdmin, NewNote, NewTenant, NewUser, Note, NoteChanges, Tenant, User, NOTE_COLUMNS, USER_COLUMNS};
use super::store::{Store, StoreError};

#[derive(Default)]
struct Tables {
    tenants: HashMap<TenantId, Tenant>,
    users: HashMap<PrincipalId, User>,
    notes: HashMap<NoteId, Note>,
}

impl Tables {
    fn ensure_email_free(&self, email: &str) -> Result<(), StoreError> {
        if self.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::Conflict(format!("user email '{}'", email)));
        }
        Ok(())
    }

    fn insert_user(&mut self, user: NewUser) -> User {
        let created = User {
            id: PrincipalId::new_v4(),
            tenant_id: user.tenant_id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        self.users.insert(created.id, created.clone());
        created
    }
}

/// Process-local store for development and tests. Scoped queries are
/// evaluated with the same filter tree the SQL backend compiles.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Rows that pass `filter`, in filter order, as clones of the originals
fn select<'a, T, K>(rows: impl Iterator<Item = (&'a K, &'a T)>, filter: &Filter) -> Result<Vec<T>, StoreError>
where
    T: Serialize + Clone + 'a,
    K: 'a,
{
    let mut originals = Vec::new();
    let mut values = Vec::new();
    for (index, (_, row)) in rows.enumerate() {
        let mut value = serde_json::to_value(row).map_err(|e| StoreError::InvalidData(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert("__row".to_string(), json!(index));
        }
        originals.push(row);
        values.push(value);
    }

    Ok(filter
        .apply(values)
        .iter()
        .filter_map(|v| v.get("__row").and_then(Value::as_u64))
        .map(|index| originals[index as usize].clone())
        .collect())
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tables.read().await.tenants.get(&id).cloned())
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.tenants.values().find(|t| t.slug == slug).cloned())
    }

    async fn provision_tenant(&self, tenant: NewTenant, admin: NewAdmin) -> Result<(Tenant, User), StoreError> {
        // Both conflict checks run before either row is written
        let mut tables = self.tables.write().await;
        if tables.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(StoreError::Conflict(format!("tenant slug '{}'", tenant.slug)));
        }
        tables.ensure_email_free(&admin.email)?;

        let now = Utc::now();
        let created = Tenant {
            id: TenantId::new_v4(),
            slug: tenant.slug,
            name: tenant.name,
            plan: tenant.plan,
            created_at: now,
            updated_at: now,
        };
        tables.tenants.insert(created.id, created.clone());
        let admin = tables.insert_user(NewUser {
            tenant_id: created.id,
            email: admin.email,
            password_hash: admin.password_hash,
            role: Role::Admin,
        });
        Ok((created, admin))
    }

    async fn set_tenant_plan(&self, id: TenantId, plan: PlanTier) -> Result<Tenant, StoreError> {
        let mut tables = self.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", id)))?;
        tenant.plan = plan;
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_user(&self, id: PrincipalId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.tenants.contains_key(&user.tenant_id) {
            return Err(StoreError::NotFound(format!("tenant {}", user.tenant_id)));
        }
        tables.ensure_email_free(&user.email)?;
        Ok(tables.insert_user(user))
    }

    async fn list_users(&self, query: &ScopedQuery) -> Result<Vec<User>, StoreError> {
        let filter = query.compile("users", USER_COLUMNS)?;
        let tables = self.tables.read().await;
        select(tables.users.iter(), &filter)
    }

    async fn locate_note(&self, id: NoteId) -> Result<Option<RecordRef>, StoreError> {
        Ok(self.tables.read().await.notes.get(&id).map(Note::record_ref))
    }

    async fn count_notes(&self, tenant_id: TenantId) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.notes.values().filter(|n| n.tenant_id == tenant_id).count() as u64)
    }

    async fn list_notes(&self, query: &ScopedQuery) -> Result<Vec<Note>, StoreError> {
        let filter = query.compile("notes", NOTE_COLUMNS)?;
        let tables = self.tables.read().await;
        select(tables.notes.iter(), &filter)
    }

    async fn get_note(&self, query: &ScopedQuery, id: NoteId) -> Result<Option<Note>, StoreError> {
        let filter = query.clone().and_where(json!({ "id": id })).compile("notes", NOTE_COLUMNS)?;
        let tables = self.tables.read().await;
        Ok(select(tables.notes.get_key_value(&id).into_iter(), &filter)?.pop())
    }

    async fn insert_note(&self, note: NewNote) -> Result<Note, StoreError> {
        // One write lock covers the plan read, the count and the insert
        let mut tables = self.tables.write().await;
        let tenant = tables
            .tenants
            .get(&note.tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", note.tenant_id)))?;

        if let Some(limit) = tenant.note_limit() {
            let count = tables.notes.values().filter(|n| n.tenant_id == note.tenant_id).count() as u64;
            if count >= limit {
                return Err(StoreError::PlanLimitReached { limit });
            }
        }

        let now = Utc::now();
        let created = Note {
            id: NoteId::new_v4(),
            tenant_id: note.tenant_id,
            author_id: note.author_id,
            title: note.title,
            content: note.content,
            created_at: now,
            updated_at: now,
        };
        tables.notes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_note(
        &self,
        query: &ScopedQuery,
        id: NoteId,
        changes: NoteChanges,
    ) -> Result<Option<Note>, StoreError> {
        let filter = query.clone().and_where(json!({ "id": id })).compile("notes", NOTE_COLUMNS)?;
        let mut tables = self.tables.write().await;
        if select(tables.notes.get_key_value(&id).into_iter(), &filter)?.is_empty() {
            return Ok(None);
        }
        let Some(note) = tables.notes.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(note);
        note.updated_at = Utc::now();
        Ok(Some(note.clone()))
    }

    async fn delete_note(&self, query: &ScopedQuery, id: NoteId) -> Result<bool, StoreError> {
        let filter = query.clone().and_where(json!({ "id": id })).compile("notes", NOTE_COLUMNS)?;
        let mut tables = self.tables.write().await;
        if select(tables.notes.get_key_value(&id).into_iter(), &filter)?.is_empty() {
            return Ok(false);
        }
        Ok(tables.notes.remove(&id).is_some())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterData;
    use crate::guard::{Principal, TenantGuard};
    use std::sync::Arc;

    fn new_tenant(slug: &str) -> NewTenant {
        NewTenant { slug: slug.to_string(), name: slug.to_string(), plan: PlanTier::Free }
    }

    fn new_admin(email: &str) -> NewAdmin {
        NewAdmin { email: email.to_string(), password_hash: "x".to_string() }
    }

    async fn tenant_with_user(store: &MemoryStore, slug: &str, role: Role) -> (Tenant, Principal) {
        let (tenant, admin) = store
            .provision_tenant(new_tenant(slug), new_admin(&format!("admin@{}.test", slug)))
            .await
            .unwrap();
        if role == Role::Admin {
            return (tenant, admin.principal());
        }
        let user = store
            .create_user(NewUser {
                tenant_id: tenant.id,
                email: format!("{}@{}.test", role, slug),
                password_hash: "x".to_string(),
                role,
            })
            .await
            .unwrap();
        (tenant, user.principal())
    }

    fn note_for(p: &Principal, title: &str) -> NewNote {
        NewNote { tenant_id: p.tenant_id(), author_id: p.id(), title: title.to_string(), content: String::new() }
    }

    #[tokio::test]
    async fn scoped_reads_never_cross_tenants() {
        let store = MemoryStore::new();
        let guard = TenantGuard::default();
        let (_, alice) = tenant_with_user(&store, "acme", Role::Admin).await;
        let (_, bob) = tenant_with_user(&store, "globex", Role::Admin).await;

        let acme_note = store.insert_note(note_for(&alice, "acme plan")).await.unwrap();
        store.insert_note(note_for(&bob, "globex plan")).await.unwrap();

        let bob_scope = guard.scope_query(&bob, FilterData::default());
        let listed = store.list_notes(&bob_scope).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "globex plan");

        assert!(store.get_note(&bob_scope, acme_note.id).await.unwrap().is_none());
        let changes = NoteChanges { title: Some("pwned".to_string()), content: None };
        assert!(store.update_note(&bob_scope, acme_note.id, changes).await.unwrap().is_none());
        assert!(!store.delete_note(&bob_scope, acme_note.id).await.unwrap());

        let alice_scope = guard.scope_query(&alice, FilterData::default());
        let still_there = store.get_note(&alice_scope, acme_note.id).await.unwrap().unwrap();
        assert_eq!(still_there.title, "acme plan");
    }

    #[tokio::test]
    async fn caller_filters_cannot_widen_the_scope() {
        let store = MemoryStore::new();
        let guard = TenantGuard::default();
        let (_, alice) = tenant_with_user(&store, "acme", Role::Admin).await;
        let (_, bob) = tenant_with_user(&store, "globex", Role::Admin).await;
        store.insert_note(note_for(&alice, "secret")).await.unwrap();

        let sneaky = FilterData {
            where_clause: Some(json!({ "$or": [ { "title": "secret" }, { "title": { "$ne": "" } } ] })),
            ..Default::default()
        };
        let listed = store.list_notes(&guard.scope_query(&bob, sneaky)).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn insert_enforces_plan_limit_atomically() {
        let store = Arc::new(MemoryStore::new());
        let (tenant, alice) = tenant_with_user(&store, "acme", Role::Member).await;
        let limit = tenant.note_limit().unwrap();

        let mut handles = Vec::new();
        for i in 0..(limit + 5) {
            let store = store.clone();
            let note = note_for(&alice, &format!("note {}", i));
            handles.push(tokio::spawn(async move { store.insert_note(note).await }));
        }

        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::PlanLimitReached { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(created, limit);
        assert_eq!(rejected, 5);
        assert_eq!(store.count_notes(tenant.id).await.unwrap(), limit);

        store.set_tenant_plan(tenant.id, PlanTier::Pro).await.unwrap();
        assert!(store.insert_note(note_for(&alice, "after upgrade")).await.is_ok());
    }

    #[tokio::test]
    async fn user_listing_is_scoped_and_emails_unique() {
        let store = MemoryStore::new();
        let guard = TenantGuard::default();
        let (acme, alice) = tenant_with_user(&store, "acme", Role::Admin).await;
        tenant_with_user(&store, "globex", Role::Admin).await;

        let users = store.list_users(&guard.scope_query(&alice, FilterData::default())).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].tenant_id, acme.id);
        assert_eq!(users[0].password_hash, "x");

        let duplicate = NewUser {
            tenant_id: acme.id,
            email: "ADMIN@acme.test".to_string(),
            password_hash: "y".to_string(),
            role: Role::Member,
        };
        assert!(matches!(store.create_user(duplicate).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn failed_provisioning_writes_nothing() {
        let store = MemoryStore::new();
        store.provision_tenant(new_tenant("acme"), new_admin("admin@acme.test")).await.unwrap();

        let taken_email = store.provision_tenant(new_tenant("initech"), new_admin("admin@acme.test")).await;
        assert!(matches!(taken_email, Err(StoreError::Conflict(_))));
        assert!(store.find_tenant_by_slug("initech").await.unwrap().is_none());

        let taken_slug = store.provision_tenant(new_tenant("acme"), new_admin("boss@initech.test")).await;
        assert!(matches!(taken_slug, Err(StoreError::Conflict(_))));
        assert!(store.find_user_by_email("boss@initech.test").await.unwrap().is_none());

        let (initech, admin) = store
            .provision_tenant(new_tenant("initech"), new_admin("boss@initech.test"))
            .await
            .unwrap();
        assert_eq!(admin.tenant_id, initech.id);
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn notes_list_newest_first_across_timestamp_precisions() {
        let store = MemoryStore::new();
        let guard = TenantGuard::default();
        let (tenant, alice) = tenant_with_user(&store, "acme", Role::Admin).await;
        let early = store.insert_note(note_for(&alice, "early")).await.unwrap();
        let late = store.insert_note(note_for(&alice, "late")).await.unwrap();

        {
            // Whole-millisecond vs microsecond instants serialize with
            // different fraction widths
            let base = "2024-05-01T10:00:20.100Z".parse::<chrono::DateTime<Utc>>().unwrap();
            let mut tables = store.tables.write().await;
            tables.notes.get_mut(&early.id).unwrap().created_at = base;
            tables.notes.get_mut(&late.id).unwrap().created_at = base + chrono::Duration::microseconds(1);
        }

        let newest_first = FilterData { order: Some(json!("created_at desc")), ..Default::default() };
        let listed = store.list_notes(&guard.scope_query(&alice, newest_first)).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["late", "early"]);
        assert_eq!(store.count_notes(tenant.id).await.unwrap(), 2);
    }
}
