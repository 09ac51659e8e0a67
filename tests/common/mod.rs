#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use notes_tenancy::database::{MemoryStore, StoreRef};
use notes_tenancy::guard::TenantGuard;
use notes_tenancy::handlers::{self, AppState};
use notes_tenancy::services::seed;

pub const PASSWORD: &str = seed::DEMO_PASSWORD;

/// The `notes-api` binary running on a free port with an in-memory store
/// and the demo tenants seeded. The process is killed when this is dropped.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_notes-api"));
        cmd.env("APP_ENV", "development")
            .env("NOTES_STORAGE", "memory")
            .env("NOTES_SEED_DEMO", "true")
            .env("NOTES_API_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().context("failed to spawn server binary")?;
        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        let url = format!("{}/health", self.base_url);
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A fresh server per test; each owns its process and port
pub async fn spawn_server() -> Result<TestServer> {
    let server = TestServer::spawn()?;
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// In-process router over a fresh memory store, demo tenants seeded
pub struct TestApp {
    pub router: Router,
    pub store: StoreRef,
}

pub async fn test_app() -> Result<TestApp> {
    let store: StoreRef = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), TenantGuard::new(true));
    seed::seed_demo(&state.tenants).await?;
    Ok(TestApp { router: handlers::router(state), store })
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let payload = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, payload))
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn login(&self, email: &str) -> Result<String> {
        let body = serde_json::json!({ "email": email, "password": PASSWORD });
        let (status, payload) = self.request(Method::POST, "/auth/login", None, Some(body)).await?;
        anyhow::ensure!(status == StatusCode::OK, "login for {} failed: {} {}", email, status, payload);
        payload["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("login response carried no token")
    }

    /// Create a note and return its id
    pub async fn create_note(&self, token: &str, title: &str) -> Result<String> {
        let (status, payload) = self
            .post("/api/notes", token, serde_json::json!({ "title": title, "content": "body" }))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create failed: {} {}", status, payload);
        payload["data"]["id"].as_str().map(str::to_string).context("created note has no id")
    }
}
