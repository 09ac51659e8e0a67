//! Tenant access guard.
//!
//! Every read or write of tenant-owned data goes through [`TenantGuard`]:
//! `authorize` decides whether the caller may perform an operation, and
//! `scope_query` produces the only query type the store will execute.
//! Both are pure; the guard performs no I/O and holds no mutable state.

pub mod decision;
pub mod principal;
pub mod request;
pub mod scope;

pub use decision::{Decision, DenyReason, GuardError};
pub use principal::Principal;
pub use request::{AccessRequest, RecordRef, Target, Usage};
pub use scope::{QueryDescriptor, ScopedQuery, TENANT_COLUMN};

use crate::types::{OperationKind, Role};

/// Privilege level an operation demands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Privilege {
    TenantMember,
    TenantAdmin,
}

fn role_grants(role: Role, privilege: Privilege) -> bool {
    match (role, privilege) {
        (Role::Admin, Privilege::TenantAdmin | Privilege::TenantMember) => true,
        (Role::Member, Privilege::TenantMember) => true,
        (Role::Member, Privilege::TenantAdmin) => false,
    }
}

fn required_privilege(principal: &Principal, request: &AccessRequest) -> Privilege {
    match request.operation {
        OperationKind::Create | OperationKind::Read | OperationKind::Update | OperationKind::List => {
            Privilege::TenantMember
        }
        OperationKind::Delete => match &request.target {
            Target::Record(record) if record.owner_id == principal.id() => Privilege::TenantMember,
            _ => Privilege::TenantAdmin,
        },
        OperationKind::InviteUser | OperationKind::ManageTenant => Privilege::TenantAdmin,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TenantGuard {
    audit: bool,
}

impl TenantGuard {
    pub fn new(audit: bool) -> Self {
        Self { audit }
    }

    pub fn from_config() -> Self {
        Self::new(crate::config::config().security.enable_audit_logging)
    }

    /// Decide one request. Checks run in a fixed order and the first
    /// failing check wins: tenant isolation, then role, then plan limit.
    pub fn authorize(&self, principal: &Principal, request: &AccessRequest) -> Result<Decision, GuardError> {
        request.validate()?;

        let decision = Self::evaluate(principal, request);
        match decision {
            Decision::Allow => tracing::debug!(
                principal = %principal.id(),
                tenant = %principal.tenant_id(),
                operation = %request.operation,
                "access allowed"
            ),
            Decision::Deny(DenyReason::CrossTenant) if self.audit => tracing::warn!(
                principal = %principal.id(),
                tenant = %principal.tenant_id(),
                target_tenant = ?request.target.tenant_id(),
                operation = %request.operation,
                "cross-tenant access denied"
            ),
            Decision::Deny(reason) => tracing::debug!(
                principal = %principal.id(),
                operation = %request.operation,
                reason = reason.code(),
                "access denied"
            ),
        }
        Ok(decision)
    }

    fn evaluate(principal: &Principal, request: &AccessRequest) -> Decision {
        if let Some(target_tenant) = request.target.tenant_id() {
            if target_tenant != principal.tenant_id() {
                return Decision::Deny(DenyReason::CrossTenant);
            }
        }

        if !role_grants(principal.role(), required_privilege(principal, request)) {
            return Decision::Deny(DenyReason::InsufficientRole);
        }

        if request.operation == OperationKind::Create && request.usage.is_some_and(|u| u.exhausted()) {
            return Decision::Deny(DenyReason::PlanLimitExceeded);
        }

        Decision::Allow
    }

    /// Constrain `base` to the caller's tenant. There is no variant of this
    /// call that omits the constraint.
    pub fn scope_query(&self, principal: &Principal, base: impl QueryDescriptor) -> ScopedQuery {
        ScopedQuery::new(principal.tenant_id(), base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ColumnType, FilterData};
    use crate::types::{NoteId, PrincipalId, TenantId};
    use serde_json::json;

    fn principal(tenant: TenantId, role: Role) -> Principal {
        Principal::new(PrincipalId::new_v4(), tenant, role)
    }

    fn record_of(tenant: TenantId, owner: PrincipalId) -> RecordRef {
        RecordRef { id: NoteId::new_v4(), tenant_id: tenant, owner_id: owner }
    }

    fn decide(p: &Principal, request: AccessRequest) -> Decision {
        TenantGuard::default().authorize(p, &request).unwrap()
    }

    #[test]
    fn cross_tenant_records_are_denied_for_every_role() {
        let acme = TenantId::new_v4();
        let globex = TenantId::new_v4();

        for role in [Role::Admin, Role::Member] {
            let p = principal(acme, role);
            let foreign = record_of(globex, PrincipalId::new_v4());
            for op in [OperationKind::Read, OperationKind::Update, OperationKind::Delete] {
                assert_eq!(
                    decide(&p, AccessRequest::new(op).on_record(foreign)),
                    Decision::Deny(DenyReason::CrossTenant),
                    "{} by {} must not cross tenants",
                    op,
                    role
                );
            }
        }
    }

    #[test]
    fn members_cannot_invite_or_manage() {
        let acme = TenantId::new_v4();
        let member = principal(acme, Role::Member);
        let admin = principal(acme, Role::Admin);

        for op in [OperationKind::InviteUser, OperationKind::ManageTenant] {
            assert_eq!(decide(&member, AccessRequest::new(op)), Decision::Deny(DenyReason::InsufficientRole));
            assert_eq!(decide(&admin, AccessRequest::new(op)), Decision::Allow);
        }
    }

    #[test]
    fn deleting_another_principals_record_needs_admin() {
        let acme = TenantId::new_v4();
        let member = principal(acme, Role::Member);
        let admin = principal(acme, Role::Admin);
        let colleague_note = record_of(acme, PrincipalId::new_v4());

        assert_eq!(
            decide(&member, AccessRequest::new(OperationKind::Delete).on_record(colleague_note)),
            Decision::Deny(DenyReason::InsufficientRole)
        );
        assert_eq!(decide(&admin, AccessRequest::new(OperationKind::Delete).on_record(colleague_note)), Decision::Allow);
        // other non-elevated operations on a colleague's record stay open
        assert_eq!(decide(&member, AccessRequest::new(OperationKind::Update).on_record(colleague_note)), Decision::Allow);
    }

    #[test]
    fn member_deletes_own_record_in_own_tenant() {
        let acme = TenantId::new_v4();
        let member = principal(acme, Role::Member);
        let own_note = record_of(acme, member.id());

        assert_eq!(decide(&member, AccessRequest::new(OperationKind::Delete).on_record(own_note)), Decision::Allow);
    }

    #[test]
    fn plan_limit_boundary() {
        let acme = TenantId::new_v4();
        let p = principal(acme, Role::Member);
        let create = AccessRequest::new(OperationKind::Create);

        assert_eq!(
            decide(&p, create.with_usage(Usage::new(100, Some(100)))),
            Decision::Deny(DenyReason::PlanLimitExceeded)
        );
        assert_eq!(decide(&p, create.with_usage(Usage::new(99, Some(100)))), Decision::Allow);
        assert_eq!(decide(&p, create.with_usage(Usage::new(10_000, None))), Decision::Allow);
        // the plan limit only gates creation
        assert_eq!(
            decide(&p, AccessRequest::new(OperationKind::List).with_usage(Usage::new(100, Some(100)))),
            Decision::Allow
        );
    }

    #[test]
    fn isolation_is_checked_before_role() {
        let acme = TenantId::new_v4();
        let globex = TenantId::new_v4();
        let member = principal(globex, Role::Member);

        assert_eq!(
            decide(&member, AccessRequest::new(OperationKind::InviteUser).on_tenant(acme)),
            Decision::Deny(DenyReason::CrossTenant)
        );
        assert_eq!(
            decide(&member, AccessRequest::new(OperationKind::Delete).on_record(record_of(acme, PrincipalId::new_v4()))),
            Decision::Deny(DenyReason::CrossTenant)
        );
    }

    #[test]
    fn create_against_a_full_foreign_tenant_is_cross_tenant() {
        let acme = TenantId::new_v4();
        let globex = TenantId::new_v4();
        let globex_admin = principal(globex, Role::Admin);

        let request = AccessRequest::new(OperationKind::Create)
            .on_tenant(acme)
            .with_usage(Usage::new(100, Some(100)));
        assert_eq!(decide(&globex_admin, request), Decision::Deny(DenyReason::CrossTenant));
    }

    #[test]
    fn malformed_requests_are_errors_not_denials() {
        let guard = TenantGuard::default();
        let p = principal(TenantId::new_v4(), Role::Admin);

        let missing_usage = AccessRequest::new(OperationKind::Create);
        assert!(matches!(guard.authorize(&p, &missing_usage), Err(GuardError::InvalidInput(_))));

        let update_without_record = AccessRequest::new(OperationKind::Update);
        assert!(matches!(guard.authorize(&p, &update_without_record), Err(GuardError::InvalidInput(_))));

        let list_one_record =
            AccessRequest::new(OperationKind::List).on_record(record_of(p.tenant_id(), p.id()));
        assert!(guard.authorize(&p, &list_one_record).is_err());
    }

    #[test]
    fn scoping_is_idempotent_and_never_dropped() {
        let guard = TenantGuard::default();
        let p = principal(TenantId::new_v4(), Role::Admin);
        let base = FilterData::where_eq("title", "x");

        let once = guard.scope_query(&p, base.clone());
        let twice = guard.scope_query(&p, once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.tenant_ids().copied().collect::<Vec<_>>(), vec![p.tenant_id()]);

        let narrowed = once.and_where(json!({ "id": "n" }));
        assert_eq!(narrowed.tenant_ids().count(), 1);
        let sql = narrowed
            .to_sql("notes", &[("id", ColumnType::Uuid), ("title", ColumnType::Text)])
            .unwrap();
        assert!(sql.query.starts_with("SELECT * FROM \"notes\" WHERE (\"tenant_id\" = $1)"));
        assert_eq!(sql.params[0], json!(p.tenant_id()));
        assert_eq!(sql.param_types[0], Some(ColumnType::Uuid));
    }

    #[test]
    fn rescoping_to_another_tenant_matches_nothing() {
        let guard = TenantGuard::default();
        let a = principal(TenantId::new_v4(), Role::Admin);
        let b = principal(TenantId::new_v4(), Role::Admin);

        let scoped = guard.scope_query(&b, guard.scope_query(&a, FilterData::default()));
        let filter = scoped.compile("notes", &[("id", ColumnType::Uuid)]).unwrap();
        assert!(!filter.matches(&json!({ "tenant_id": a.tenant_id() })));
        assert!(!filter.matches(&json!({ "tenant_id": b.tenant_id() })));
    }
}
