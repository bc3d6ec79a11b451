use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Form;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use super::*;
use crate::storage::MemoryCredentialStore;

// =============================================================================
// Test server — mimics the scan service's auth routes.
// =============================================================================

async fn login_route(Form(form): Form<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    match (form.get("username").map(String::as_str), form.get("password").map(String::as_str)) {
        (Some("alice"), Some("pw")) => Ok(Json(json!({ "access_token": "tok-alice", "token_type": "bearer" }))),
        (Some("blank"), _) => Ok(Json(json!({ "access_token": "", "token_type": "bearer" }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn me_route(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
    match auth {
        Some("Bearer tok-alice") => Ok(Json(json!({
            "username": "alice",
            "email": "alice@example.test",
            "full_name": "Alice Liddell",
            "disabled": false,
        }))),
        Some("Bearer tok-garbled") => Ok(Json(json!({ "unexpected": true }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn register_route(Json(body): Json<Value>) -> StatusCode {
    let complete = ["username", "email", "password", "full_name"]
        .iter()
        .all(|k| body.get(k).is_some_and(Value::is_string));
    if !complete {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    if body["username"] == "alice" { StatusCode::BAD_REQUEST } else { StatusCode::OK }
}

async fn scans_route(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer tok-alice") => Ok(Json(json!([{ "scan_id": "s1", "filename": "nmap.xml" }]))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Serve the test routes on an ephemeral port; returns the base URL.
async fn spawn_server() -> String {
    let app = Router::new()
        .route(LOGIN_PATH, post(login_route))
        .route(IDENTITY_PATH, get(me_route))
        .route(REGISTER_PATH, post(register_route))
        .route("/api/scans", get(scans_route));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn api() -> HttpIdentityApi {
    let base = spawn_server().await;
    HttpIdentityApi::new(SessionConfig::new(base, ".unused")).unwrap()
}

fn registration(username: &str) -> Registration {
    Registration {
        username: username.into(),
        email: format!("{username}@example.test"),
        password: "pw".into(),
        full_name: String::new(),
    }
}

// =============================================================================
// login
// =============================================================================

#[tokio::test]
async fn login_returns_access_token() {
    let api = api().await;
    let cred = api.login("alice", "pw").await.unwrap();
    assert_eq!(cred.as_str(), "tok-alice");
}

#[tokio::test]
async fn login_bad_password_is_status_error() {
    let api = api().await;
    let err = api.login("alice", "nope").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 401, .. }), "{err:?}");
    assert!(err.is_rejection());
}

#[tokio::test]
async fn login_empty_token_is_parse_error() {
    let api = api().await;
    let err = api.login("blank", "pw").await.unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn login_unreachable_is_request_error() {
    let api = HttpIdentityApi::new(SessionConfig::new("http://127.0.0.1:1", ".unused")).unwrap();
    let err = api.login("alice", "pw").await.unwrap_err();
    assert!(matches!(err, ApiError::Request(_)), "{err:?}");
    assert!(!err.is_rejection());
}

// =============================================================================
// resolve_identity
// =============================================================================

#[tokio::test]
async fn resolve_identity_sends_bearer() {
    let api = api().await;
    let who = api.resolve_identity(&Credential::new("tok-alice")).await.unwrap();
    assert_eq!(who.username, "alice");
    assert_eq!(who.display_name(), "Alice Liddell");
}

#[tokio::test]
async fn resolve_identity_rejected_token() {
    let api = api().await;
    let err = api.resolve_identity(&Credential::new("tok-expired")).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 401, .. }), "{err:?}");
}

#[tokio::test]
async fn resolve_identity_malformed_body() {
    let api = api().await;
    let err = api.resolve_identity(&Credential::new("tok-garbled")).await.unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)), "{err:?}");
}

// =============================================================================
// register
// =============================================================================

#[tokio::test]
async fn register_posts_full_json_body() {
    let api = api().await;
    api.register(&registration("bob")).await.unwrap();
}

#[tokio::test]
async fn register_duplicate_is_status_error() {
    let api = api().await;
    let err = api.register(&registration("alice")).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 400, .. }), "{err:?}");
}

#[test]
fn registration_debug_hides_password() {
    let reg = Registration { password: "hunter2".into(), ..registration("bob") };
    assert!(!format!("{reg:?}").contains("hunter2"));
}

// =============================================================================
// end to end through the session store
// =============================================================================

#[tokio::test]
async fn session_over_http_login_and_authorized_call() {
    let base = spawn_server().await;
    let config = SessionConfig::new(base, ".unused");
    let storage = Arc::new(MemoryCredentialStore::new());
    let session = SessionStore::new(Arc::new(HttpIdentityApi::new(config.clone()).unwrap()), storage.clone());
    session.bootstrap().await;

    let client = AuthorizedClient::new(config, session.clone()).unwrap();
    let err = client.get_json::<Value>("/api/scans").await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));

    session.authenticate("alice", "pw").await.unwrap();
    let scans: Value = client.get_json("/api/scans").await.unwrap();
    assert_eq!(scans[0]["scan_id"], "s1");

    session.terminate();
    assert!(matches!(client.get_json::<Value>("/api/scans").await, Err(ApiError::NotAuthenticated)));
}

#[tokio::test]
async fn session_over_http_bootstrap_discards_expired_token() {
    let base = spawn_server().await;
    let config = SessionConfig::new(base, ".unused");
    let storage = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok-expired")));
    let session = SessionStore::new(Arc::new(HttpIdentityApi::new(config).unwrap()), storage.clone());

    assert_eq!(session.bootstrap().await, crate::types::Readiness::Anonymous);
    assert!(crate::storage::CredentialStore::load(storage.as_ref()).unwrap().is_none());
}
