use anyhow::Context;
use axum::{extract::DefaultBodyLimit, http::HeaderValue};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use notes_tenancy::config;
use notes_tenancy::database;
use notes_tenancy::guard::TenantGuard;
use notes_tenancy::handlers::{self, AppState};
use notes_tenancy::services::seed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")))
        .init();

    let config = config::config();
    tracing::info!("Starting Notes API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set outside development");
    }

    let store = database::open_store().await.context("failed to open store")?;
    let state = AppState::new(store, TenantGuard::from_config());

    if config.database.seed_demo_data {
        if !notes_tenancy::is_development!() {
            tracing::warn!("Seeding demo tenants outside development");
        }
        seed::seed_demo(&state.tenants).await.context("failed to seed demo data")?;
    }

    let mut app = handlers::router(state).layer(
        ServiceBuilder::new()
            .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
            .layer(cors_layer()),
    );
    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Notes API listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer() -> CorsLayer {
    let security = &config::config().security;
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
