pub mod seed;
pub mod tenant_service;

pub use tenant_service::{TenantError, TenantService};
