/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::guard::GuardError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_newtype!(
    /// Identity of an isolated customer account
    TenantId
);
uuid_newtype!(
    /// Identity of an authenticated caller
    PrincipalId
);
uuid_newtype!(
    /// Identity of a tenant-owned note
    NoteId
);

/// Caller role within its tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(GuardError::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription tier of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }

    /// Note limit for this tier. `None` means unlimited.
    pub fn note_limit(&self) -> Option<u64> {
        let plans = &crate::config::config().plans;
        match self {
            PlanTier::Free => Some(plans.free_note_limit),
            PlanTier::Pro => plans.pro_note_limit,
        }
    }
}

impl FromStr for PlanTier {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            other => Err(GuardError::InvalidInput(format!("unknown plan '{}'", other))),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation kinds the access guard knows how to decide on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    List,
    InviteUser,
    ManageTenant,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Create,
        OperationKind::Read,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::List,
        OperationKind::InviteUser,
        OperationKind::ManageTenant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::List => "list",
            OperationKind::InviteUser => "invite-user",
            OperationKind::ManageTenant => "manage-tenant",
        }
    }
}

impl FromStr for OperationKind {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| GuardError::InvalidInput(format!("unrecognized operation kind '{}'", s)))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kinds_parse_from_wire_names() {
        for op in OperationKind::ALL {
            assert_eq!(op.as_str().parse::<OperationKind>().unwrap(), op);
        }
        assert_eq!(
            serde_json::to_value(OperationKind::InviteUser).unwrap(),
            serde_json::json!("invite-user")
        );
    }

    #[test]
    fn unknown_operation_is_invalid_input() {
        let err = "purge".parse::<OperationKind>().unwrap_err();
        assert!(matches!(err, GuardError::InvalidInput(_)));
    }

    #[test]
    fn roles_and_plans_round_trip_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("member".parse::<Role>().unwrap(), Role::Member);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert!("enterprise".parse::<PlanTier>().is_err());
    }
}
