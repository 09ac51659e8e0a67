use serde::Serialize;
use uuid::Uuid;

use crate::types::{PrincipalId, Role, TenantId};

use super::GuardError;

/// An authenticated caller. Tenant and role are fixed at construction;
/// there is no setter for either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: PrincipalId,
    tenant_id: TenantId,
    role: Role,
}

impl Principal {
    pub fn new(id: PrincipalId, tenant_id: TenantId, role: Role) -> Self {
        Self { id, tenant_id, role }
    }

    /// Build from loosely-typed parts, e.g. decoded token claims.
    pub fn from_parts(id: Option<Uuid>, tenant_id: Option<Uuid>, role: Option<&str>) -> Result<Self, GuardError> {
        let id = id.ok_or_else(|| GuardError::InvalidInput("principal is missing an id".to_string()))?;
        let tenant_id =
            tenant_id.ok_or_else(|| GuardError::InvalidInput("principal is missing a tenant".to_string()))?;
        let role = role
            .ok_or_else(|| GuardError::InvalidInput("principal is missing a role".to_string()))?
            .parse::<Role>()?;
        Ok(Self::new(id.into(), tenant_id.into(), role))
    }

    pub fn id(&self) -> PrincipalId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parts_are_contract_violations() {
        let id = Some(Uuid::new_v4());
        let tenant = Some(Uuid::new_v4());

        assert!(Principal::from_parts(id, tenant, Some("member")).is_ok());
        assert!(matches!(Principal::from_parts(id, None, Some("admin")), Err(GuardError::InvalidInput(_))));
        assert!(matches!(Principal::from_parts(id, tenant, None), Err(GuardError::InvalidInput(_))));
        assert!(matches!(Principal::from_parts(None, tenant, Some("admin")), Err(GuardError::InvalidInput(_))));
        assert!(matches!(Principal::from_parts(id, tenant, Some("root")), Err(GuardError::InvalidInput(_))));
    }
}
