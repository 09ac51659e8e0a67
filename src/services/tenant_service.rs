use thiserror::Error;

use crate::auth::{self, AuthError};
use crate::database::models::{NewAdmin, NewTenant, NewUser, Tenant, User};
use crate::database::{StoreError, StoreRef};
use crate::guard::{AccessRequest, DenyReason, GuardError, Principal, TenantGuard};
use crate::types::{OperationKind, PlanTier, Role, TenantId};

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Invalid tenant slug: {0}")]
    InvalidSlug(String),
    #[error("Invalid email: {0}")]
    InvalidEmail(String),
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("Tenant not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Denied(#[from] DenyReason),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

const MIN_PASSWORD_LEN: usize = 8;

/// Tenant lifecycle: provisioning, plan changes and user invitations
#[derive(Clone)]
pub struct TenantService {
    store: StoreRef,
    guard: TenantGuard,
}

impl TenantService {
    pub fn new(store: StoreRef, guard: TenantGuard) -> Self {
        Self { store, guard }
    }

    /// Create a free-tier tenant and its first admin in one store write.
    /// Operator-only; there is no principal to authorize yet.
    pub async fn provision(
        &self,
        slug: &str,
        name: &str,
        admin_email: &str,
        admin_password: &str,
    ) -> Result<(Tenant, User), TenantError> {
        validate_slug(slug)?;
        validate_email(admin_email)?;
        validate_password(admin_password)?;

        let tenant = NewTenant { slug: slug.to_string(), name: name.to_string(), plan: PlanTier::Free };
        let admin = NewAdmin { email: admin_email.to_string(), password_hash: auth::hash_password(admin_password)? };
        let (tenant, admin) = self.store.provision_tenant(tenant, admin).await?;

        tracing::info!(tenant = %tenant.id, slug = %tenant.slug, admin = %admin.id, "Provisioned tenant");
        Ok((tenant, admin))
    }

    pub async fn upgrade(&self, principal: &Principal, tenant_id: TenantId, plan: PlanTier) -> Result<Tenant, TenantError> {
        let request = AccessRequest::new(OperationKind::ManageTenant).on_tenant(tenant_id);
        self.guard.authorize(principal, &request)?.into_result()?;

        let tenant = self.store.set_tenant_plan(tenant_id, plan).await?;
        tracing::info!(tenant = %tenant.id, plan = %plan, by = %principal.id(), "Changed tenant plan");
        Ok(tenant)
    }

    /// Add a user to the inviting admin's own tenant
    pub async fn invite(
        &self,
        principal: &Principal,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, TenantError> {
        let request = AccessRequest::new(OperationKind::InviteUser);
        self.guard.authorize(principal, &request)?.into_result()?;

        let user = self.create_user(principal.tenant_id(), email, password, role).await?;
        tracing::info!(tenant = %user.tenant_id, user = %user.id, role = %role, by = %principal.id(), "Invited user");
        Ok(user)
    }

    /// Operator path for adding a user to a tenant; no principal involved
    pub async fn add_user(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, TenantError> {
        let user = self.create_user(tenant_id, email, password, role).await?;
        tracing::info!(tenant = %user.tenant_id, user = %user.id, role = %role, "Added user");
        Ok(user)
    }

    async fn create_user(&self, tenant_id: TenantId, email: &str, password: &str, role: Role) -> Result<User, TenantError> {
        validate_email(email)?;
        validate_password(password)?;

        let user = NewUser { tenant_id, email: email.to_string(), password_hash: auth::hash_password(password)?, role };
        Ok(self.store.create_user(user).await?)
    }

    /// Resolve a slug for operator tooling
    pub async fn tenant_by_slug(&self, slug: &str) -> Result<Tenant, TenantError> {
        self.store
            .find_tenant_by_slug(slug)
            .await?
            .ok_or_else(|| TenantError::NotFound(slug.to_string()))
    }
}

fn validate_slug(slug: &str) -> Result<(), TenantError> {
    if slug.len() < 2 {
        return Err(TenantError::InvalidSlug("Tenant slug must be at least 2 characters".to_string()));
    }
    if slug.len() > 100 {
        return Err(TenantError::InvalidSlug("Tenant slug must be less than 100 characters".to_string()));
    }
    if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Err(TenantError::InvalidSlug(
            "Tenant slug can only contain lowercase letters, numbers, hyphens, and underscores".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), TenantError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace) => {
            Ok(())
        }
        _ => Err(TenantError::InvalidEmail(email.to_string())),
    }
}

fn validate_password(password: &str) -> Result<(), TenantError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(TenantError::WeakPassword);
    }
    Ok(())
}
