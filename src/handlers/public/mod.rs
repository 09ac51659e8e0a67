// handlers/public - no authentication required; token acquisition only
pub mod auth;
