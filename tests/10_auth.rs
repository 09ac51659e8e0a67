mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn root_describes_the_service() -> Result<()> {
    let server = common::spawn_server().await?;
    let body = reqwest::get(format!("{}/", server.base_url)).await?.json::<Value>().await?;

    assert_eq!(body["success"], true);
    assert!(body["data"]["endpoints"]["notes"].is_string());
    Ok(())
}

#[tokio::test]
async fn login_then_whoami() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&json!({ "email": "user@acme.test", "password": common::PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    let token = body["data"]["token"].as_str().unwrap_or_default().to_string();
    assert!(!token.is_empty(), "no token in {}", body);
    assert!(body["data"]["user"].get("password_hash").is_none());

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["user"]["email"], "user@acme.test");
    assert_eq!(body["data"]["principal"]["role"], "member");
    assert_eq!(body["data"]["tenant"]["slug"], "acme");
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    for (email, password) in [("admin@acme.test", "not-the-password"), ("nobody@acme.test", common::PASSWORD)] {
        let res = client
            .post(format!("{}/auth/login", server.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = res.json::<Value>().await?;
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/api/notes", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/api/notes", server.base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn server_process_stops_when_dropped() -> Result<()> {
    let server = common::spawn_server().await?;
    let health = format!("{}/health", server.base_url);
    assert_eq!(reqwest::get(&health).await?.status(), StatusCode::OK);

    drop(server);
    assert!(reqwest::get(&health).await.is_err());
    Ok(())
}
