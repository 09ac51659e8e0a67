use serde::Serialize;

use crate::types::{NoteId, OperationKind, PrincipalId, TenantId};

use super::GuardError;

/// Ownership facts about one record: enough to authorize, no content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    pub id: NoteId,
    pub tenant_id: TenantId,
    pub owner_id: PrincipalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Collection-level operation scoped to the caller's own tenant
    OwnTenant,
    /// Explicit tenant parameter supplied by the caller
    Tenant(TenantId),
    Record(RecordRef),
}

impl Target {
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Target::OwnTenant => None,
            Target::Tenant(id) => Some(*id),
            Target::Record(record) => Some(record.tenant_id),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Target::OwnTenant => "no explicit target",
            Target::Tenant(_) => "a tenant",
            Target::Record(_) => "a record",
        }
    }
}

/// Current record count of a tenant against its plan limit.
/// `limit: None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub count: u64,
    pub limit: Option<u64>,
}

impl Usage {
    pub fn new(count: u64, limit: Option<u64>) -> Self {
        Self { count, limit }
    }

    pub fn exhausted(&self) -> bool {
        matches!(self.limit, Some(limit) if self.count >= limit)
    }
}

/// One operation the caller wants to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    pub operation: OperationKind,
    pub target: Target,
    pub usage: Option<Usage>,
}

impl AccessRequest {
    pub fn new(operation: OperationKind) -> Self {
        Self { operation, target: Target::OwnTenant, usage: None }
    }

    pub fn on_tenant(mut self, tenant_id: TenantId) -> Self {
        self.target = Target::Tenant(tenant_id);
        self
    }

    pub fn on_record(mut self, record: RecordRef) -> Self {
        self.target = Target::Record(record);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Shape check: which target kinds each operation accepts, and that
    /// `create` carries the usage the plan check needs.
    pub(crate) fn validate(&self) -> Result<(), GuardError> {
        use OperationKind::*;

        let target_ok = match (self.operation, &self.target) {
            (Create | List | InviteUser | ManageTenant, Target::OwnTenant | Target::Tenant(_)) => true,
            (Read, Target::Tenant(_) | Target::Record(_)) => true,
            (Update | Delete, Target::Record(_)) => true,
            _ => false,
        };
        if !target_ok {
            return Err(GuardError::InvalidInput(format!(
                "operation '{}' cannot take {}",
                self.operation,
                self.target.describe()
            )));
        }

        if self.operation == Create && self.usage.is_none() {
            return Err(GuardError::InvalidInput("create requires the tenant's current usage".to_string()));
        }
        Ok(())
    }
}
