mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn login(client: &reqwest::Client, base_url: &str, prefix: &str) -> Result<Value> {
    let username = common::unique_username(prefix);
    common::register_and_login(client, base_url, &username).await
}

#[tokio::test]
async fn shift_mints_service_scoped_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let alice = login(&client, &server.base_url, "alice").await?;
    let access = alice["access_token"].as_str().unwrap();

    let res = client
        .post(format!("{}/api/shifting/request", server.base_url))
        .bearer_auth(access)
        .json(&json!({
            "target_service": "analytics-service",
            "reason": "dashboard report",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = res.json::<Value>().await?;
    assert!(body["shift_id"].is_string());
    assert_eq!(body["source_service"], "api-gateway");
    assert_eq!(body["target_service"], "analytics-service");
    let new_token = body["new_token"].as_str().unwrap();
    assert_ne!(new_token, access);

    // The shifted credential is not a session: it cannot pass the gate
    let profile = client
        .get(format!("{}/api/auth/profile", server.base_url))
        .bearer_auth(new_token)
        .send()
        .await?;
    assert_eq!(profile.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn unknown_target_service_lists_choices() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let user = login(&client, &server.base_url, "ivan").await?;

    let res = client
        .post(format!("{}/api/shifting/request", server.base_url))
        .bearer_auth(user["access_token"].as_str().unwrap())
        .json(&json!({ "target_service": "billing-service" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = res.json::<Value>().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let message = body["field_errors"]["target_service"].as_str().unwrap();
    assert!(message.contains("analytics-service"));
    assert!(message.contains("tracking-service"));

    Ok(())
}

#[tokio::test]
async fn ttl_window_boundaries() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let user = login(&client, &server.base_url, "judy").await?;
    let access = user["access_token"].as_str().unwrap();

    for (expires_in, expected) in [
        (299, StatusCode::BAD_REQUEST),
        (300, StatusCode::CREATED),
        (86400, StatusCode::CREATED),
        (86401, StatusCode::BAD_REQUEST),
    ] {
        let res = client
            .post(format!("{}/api/shifting/request", server.base_url))
            .bearer_auth(access)
            .json(&json!({
                "target_service": "tracking-service",
                "expires_in": expires_in,
            }))
            .send()
            .await?;
        assert_eq!(res.status(), expected, "expires_in={}", expires_in);
    }

    Ok(())
}

#[tokio::test]
async fn history_is_recent_first_and_redacted() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let user = login(&client, &server.base_url, "kate").await?;
    let access = user["access_token"].as_str().unwrap();

    for target in ["users-service", "shipping-service"] {
        let res = client
            .post(format!("{}/api/shifting/request", server.base_url))
            .bearer_auth(access)
            .json(&json!({ "target_service": target }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = client
        .get(format!("{}/api/shifting/history", server.base_url))
        .bearer_auth(access)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["count"], 2);
    let shifts = body["shifts"].as_array().unwrap();
    assert_eq!(shifts[0]["target_service"], "shipping-service");
    assert_eq!(shifts[1]["target_service"], "users-service");
    for shift in shifts {
        assert!(shift.get("shifted_token").is_none());
        assert!(shift.get("original_token").is_none());
        assert_eq!(shift["is_expired"], false);
    }

    Ok(())
}

#[tokio::test]
async fn second_revoke_is_not_found() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let user = login(&client, &server.base_url, "leo").await?;
    let access = user["access_token"].as_str().unwrap();

    let shift = client
        .post(format!("{}/api/shifting/request", server.base_url))
        .bearer_auth(access)
        .json(&json!({ "target_service": "notifications-service" }))
        .send()
        .await?
        .json::<Value>()
        .await?;
    let shift_id = shift["shift_id"].as_str().unwrap();

    let first = client
        .post(format!("{}/api/shifting/{}/revoke", server.base_url, shift_id))
        .bearer_auth(access)
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::OK);

    let second = client
        .post(format!("{}/api/shifting/{}/revoke", server.base_url, shift_id))
        .bearer_auth(access)
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn foreign_shift_cannot_be_revoked() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let alice = login(&client, &server.base_url, "alice").await?;
    let mallory = login(&client, &server.base_url, "mallory").await?;

    let shift = client
        .post(format!("{}/api/shifting/request", server.base_url))
        .bearer_auth(alice["access_token"].as_str().unwrap())
        .json(&json!({ "target_service": "users-service" }))
        .send()
        .await?
        .json::<Value>()
        .await?;
    let shift_id = shift["shift_id"].as_str().unwrap();

    let res = client
        .post(format!("{}/api/shifting/{}/revoke", server.base_url, shift_id))
        .bearer_auth(mallory["access_token"].as_str().unwrap())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn validate_checks_scope_and_revocation() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let user = login(&client, &server.base_url, "nina").await?;
    let access = user["access_token"].as_str().unwrap();

    let shift = client
        .post(format!("{}/api/shifting/request", server.base_url))
        .bearer_auth(access)
        .json(&json!({ "target_service": "tracking-service" }))
        .send()
        .await?
        .json::<Value>()
        .await?;
    let shifted_token = shift["new_token"].as_str().unwrap();
    let shift_id = shift["shift_id"].as_str().unwrap();

    // Valid for the right service
    let res = client
        .post(format!("{}/api/shifting/validate", server.base_url))
        .bearer_auth(access)
        .json(&json!({ "token": shifted_token, "expected_service": "tracking-service" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["valid"], true);
    assert_eq!(body["service"], "tracking-service");

    // Wrong service is named specifically
    let res = client
        .post(format!("{}/api/shifting/validate", server.base_url))
        .bearer_auth(access)
        .json(&json!({ "token": shifted_token, "expected_service": "users-service" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = res.json::<Value>().await?;
    assert!(body["message"].as_str().unwrap().contains("tracking-service"));

    // An unshifted credential carries no service scope
    let res = client
        .post(format!("{}/api/shifting/validate", server.base_url))
        .bearer_auth(access)
        .json(&json!({ "token": access, "expected_service": "users-service" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Revocation is visible to validation
    client
        .post(format!("{}/api/shifting/{}/revoke", server.base_url, shift_id))
        .bearer_auth(access)
        .send()
        .await?;
    let res = client
        .post(format!("{}/api/shifting/validate", server.base_url))
        .bearer_auth(access)
        .json(&json!({ "token": shifted_token, "expected_service": "tracking-service" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = res.json::<Value>().await?;
    assert!(body["message"].as_str().unwrap().contains("revoked"));

    // Usage was counted for the successful validation
    let history = client
        .get(format!("{}/api/shifting/history", server.base_url))
        .bearer_auth(access)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(history["shifts"][0]["usage_count"], 1);

    Ok(())
}
