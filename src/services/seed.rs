use crate::types::Role;

use super::tenant_service::{TenantError, TenantService};

pub const DEMO_PASSWORD: &str = "password";
pub const DEMO_TENANTS: &[(&str, &str)] = &[("acme", "Acme"), ("globex", "Globex")];

/// Two demo tenants, each with `admin@<slug>.test` and `user@<slug>.test`.
/// Skips tenants that already exist.
pub async fn seed_demo(service: &TenantService) -> Result<(), TenantError> {
    for (slug, name) in DEMO_TENANTS {
        if service.tenant_by_slug(slug).await.is_ok() {
            tracing::debug!("Demo tenant {} already present", slug);
            continue;
        }

        let (_, admin) = service
            .provision(slug, name, &format!("admin@{}.test", slug), DEMO_PASSWORD)
            .await?;
        service
            .invite(&admin.principal(), &format!("user@{}.test", slug), DEMO_PASSWORD, Role::Member)
            .await?;
    }

    tracing::info!("Demo tenants seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, Store};
    use crate::guard::TenantGuard;
    use std::sync::Arc;

    #[tokio::test]
    async fn seeding_is_repeatable() {
        let store = Arc::new(MemoryStore::new());
        let service = TenantService::new(store.clone(), TenantGuard::default());

        seed_demo(&service).await.unwrap();
        seed_demo(&service).await.unwrap();

        let member = store.find_user_by_email("user@globex.test").await.unwrap().unwrap();
        assert_eq!(member.role, Role::Member);
        let acme = store.find_tenant_by_slug("acme").await.unwrap().unwrap();
        let admin = store.find_user_by_email("admin@acme.test").await.unwrap().unwrap();
        assert_eq!(admin.tenant_id, acme.id);
    }
}
