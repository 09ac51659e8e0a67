use serde::Serialize;
use thiserror::Error;

/// Outcome of one authorization check
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    /// `Ok(())` on allow, the deny reason otherwise
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Why a request was denied. These are expected policy outcomes, not defects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Error)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    #[error("target belongs to another tenant")]
    CrossTenant,
    #[error("operation requires the admin role")]
    InsufficientRole,
    #[error("tenant plan limit reached; upgrade to continue")]
    PlanLimitExceeded,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::CrossTenant => "CROSS_TENANT",
            DenyReason::InsufficientRole => "INSUFFICIENT_ROLE",
            DenyReason::PlanLimitExceeded => "PLAN_LIMIT_EXCEEDED",
        }
    }
}

/// Caller bug: the surrounding system handed the guard something it should
/// have resolved first. Never a policy outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("invalid access guard input: {0}")]
    InvalidInput(String),
}
