// handlers/mod.rs - two security tiers
//
// Public (no auth) → Protected (JWT auth). Every protected handler that
// touches tenant data asks the access guard first, then reads through a
// scoped query.
pub mod protected;
pub mod public;

use axum::{
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::database::StoreRef;
use crate::guard::TenantGuard;
use crate::middleware::jwt_auth_middleware;
use crate::services::TenantService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: StoreRef,
    pub guard: TenantGuard,
    pub tenants: TenantService,
}

impl AppState {
    pub fn new(store: StoreRef, guard: TenantGuard) -> Self {
        let tenants = TenantService::new(store.clone(), guard.clone());
        Self { store, guard, tenants }
    }
}

/// Full application router, without global layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        .merge(protected_routes())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(public::auth::login_post))
}

fn protected_routes() -> Router<AppState> {
    use protected::{auth, notes, tenants, users};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami_get))
        .route("/api/notes", get(notes::notes_list).post(notes::note_create))
        .route("/api/notes/find", post(notes::notes_find))
        .route(
            "/api/notes/:id",
            get(notes::note_get).put(notes::note_update).delete(notes::note_delete),
        )
        .route("/api/tenants/:id", get(tenants::tenant_get))
        .route("/api/tenants/:id/upgrade", post(tenants::tenant_upgrade))
        .route("/api/users", get(users::users_list))
        .route("/api/users/invite", post(users::user_invite))
        .route_layer(from_fn(jwt_auth_middleware))
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Notes API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-tenant notes service",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "login": "/auth/login (public - token acquisition)",
                "auth": "/api/auth/whoami (protected)",
                "notes": "/api/notes[/:id], /api/notes/find (protected)",
                "tenants": "/api/tenants/:id[/upgrade] (protected)",
                "users": "/api/users, /api/users/invite (protected)",
            }
        }
    }))
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
