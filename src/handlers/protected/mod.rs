// handlers/protected - JWT authentication required (/api/*)
//
// The auth middleware has already placed the caller's Principal in request
// extensions; handlers take it with `Extension<Principal>`.
pub mod auth;
pub mod notes;
pub mod tenants;
pub mod users;
