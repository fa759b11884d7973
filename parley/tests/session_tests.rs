//! Tests for restoring, establishing and ending the signed-in session

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use tokio::time::timeout;

use parley_lib::api::auth::{AuthSession, AuthUser};
use parley_lib::{AuthContext, AuthState, ClientConfig, Platform, SessionStore};

fn platform(server: &MockServer) -> Platform {
    Platform::new(ClientConfig::new(&server.base_url(), "anon").unwrap())
}

fn auth_user() -> serde_json::Value {
    json!({
        "id": "ada",
        "email": "ada@example.com",
        "user_metadata": { "full_name": "Ada Lovelace" }
    })
}

fn saved_session(expires_at: Option<i64>) -> AuthSession {
    AuthSession {
        access_token: "saved-jwt".to_string(),
        refresh_token: "saved-refresh".to_string(),
        expires_at,
        user: serde_json::from_value::<AuthUser>(auth_user()).unwrap(),
    }
}

async fn mock_password_sign_in(server: &MockServer, expires_in: i64) {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password");
            then.status(200).json_body(json!({
                "access_token": "jwt-ada",
                "refresh_token": "refresh-ada",
                "expires_in": expires_in,
                "user": auth_user()
            }));
        })
        .await;
}

async fn mock_profile_upsert(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/users")
                .header("prefer", "resolution=merge-duplicates,return=minimal");
            then.status(201);
        })
        .await
}

#[tokio::test]
async fn test_sign_in_persists_and_publishes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password");
            then.status(200).json_body(json!({
                "access_token": "jwt-ada",
                "refresh_token": "refresh-ada",
                "expires_in": 3600,
                "user": auth_user()
            }));
        })
        .await;
    let upsert = mock_profile_upsert(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let auth = AuthContext::init(platform(&server), store.clone()).await;
    let mut states = auth.subscribe();
    assert_eq!(auth.state(), AuthState::SignedOut);

    let user = auth.sign_in(" ada@example.com ", "Sup3r$ecret").await.unwrap();

    assert_eq!(user.full_name.as_deref(), Some("Ada Lovelace"));
    assert!(states.has_changed().unwrap());
    assert_eq!(states.borrow_and_update().user().map(|u| u.id.as_str()), Some("ada"));
    assert_eq!(auth.platform().access_token().as_deref(), Some("jwt-ada"));
    assert_eq!(store.load().unwrap().access_token, "jwt-ada");
    upsert.assert_async().await;
}

#[tokio::test]
async fn test_invalid_sign_in_input_makes_no_request() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let auth = AuthContext::init(platform(&server), SessionStore::new(dir.path().join("s.json"))).await;

    assert!(auth.sign_in("not-an-email", "x").await.unwrap_err().is_validation());
    assert!(auth.sign_in("ada@example.com", "").await.unwrap_err().is_validation());
    assert_eq!(token.hits_async().await, 0);
}

#[tokio::test]
async fn test_weak_password_rejected_at_sign_up() {
    let server = MockServer::start_async().await;
    let signup = server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/signup");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let auth = AuthContext::init(platform(&server), SessionStore::new(dir.path().join("s.json"))).await;

    let err = auth.sign_up("ada@example.com", "short", "Ada").await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(signup.hits_async().await, 0);
}

#[tokio::test]
async fn test_init_restores_accepted_session() {
    let server = MockServer::start_async().await;
    let check = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/auth/v1/user")
                .header("authorization", "Bearer saved-jwt");
            then.status(200).json_body(auth_user());
        })
        .await;
    mock_profile_upsert(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store.save(&saved_session(None)).unwrap();

    let auth = AuthContext::init(platform(&server), store).await;

    check.assert_async().await;
    assert_eq!(auth.current_user().unwrap().id, "ada");
    assert_eq!(auth.session().unwrap().access_token, "saved-jwt");
}

#[tokio::test]
async fn test_init_refreshes_expired_session() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "refresh_token")
                .json_body(json!({ "refresh_token": "saved-refresh" }));
            then.status(200).json_body(json!({
                "access_token": "fresh-jwt",
                "refresh_token": "fresh-refresh",
                "expires_in": 3600,
                "user": auth_user()
            }));
        })
        .await;
    mock_profile_upsert(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store.save(&saved_session(Some(1))).unwrap();

    let auth = AuthContext::init(platform(&server), store.clone()).await;

    refresh.assert_async().await;
    assert_eq!(auth.session().unwrap().access_token, "fresh-jwt");
    assert_eq!(store.load().unwrap().refresh_token, "fresh-refresh");
}

#[tokio::test]
async fn test_init_discards_rejected_session() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/auth/v1/user");
            then.status(401).json_body(json!({ "msg": "invalid JWT" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400).json_body(json!({ "error_description": "Refresh Token Not Found" }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = SessionStore::new(&path);
    store.save(&saved_session(None)).unwrap();

    let auth = AuthContext::init(platform(&server), store).await;

    assert_eq!(auth.state(), AuthState::SignedOut);
    assert!(auth.platform().access_token().is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_sign_out_clears_even_when_remote_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/auth/v1/user");
            then.status(200).json_body(auth_user());
        })
        .await;
    mock_profile_upsert(&server).await;
    let logout = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/logout")
                .header("authorization", "Bearer saved-jwt");
            then.status(503);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = SessionStore::new(&path);
    store.save(&saved_session(None)).unwrap();
    let auth = AuthContext::init(platform(&server), store).await;
    assert!(auth.current_user().is_some());

    auth.sign_out().await.unwrap();

    logout.assert_async().await;
    assert_eq!(auth.state(), AuthState::SignedOut);
    assert!(auth.session().is_none());
    assert!(auth.platform().access_token().is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_token_refreshed_before_expiry() {
    let server = MockServer::start_async().await;
    // Expires shortly after the refresh margin opens
    mock_password_sign_in(&server, 62).await;
    mock_profile_upsert(&server).await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "refresh_token")
                .json_body(json!({ "refresh_token": "refresh-ada" }));
            then.status(200).json_body(json!({
                "access_token": "jwt-ada-2",
                "refresh_token": "refresh-ada-2",
                "expires_in": 3600,
                "user": auth_user()
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let auth = AuthContext::init(platform(&server), store.clone()).await;
    auth.sign_in("ada@example.com", "Sup3r$ecret").await.unwrap();

    let mut tokens = auth.watch_token();
    timeout(Duration::from_secs(5), async {
        while tokens.borrow_and_update().as_deref() != Some("jwt-ada-2") {
            tokens.changed().await.unwrap();
        }
    })
    .await
    .expect("token was never refreshed");

    refresh.assert_async().await;
    assert_eq!(auth.platform().access_token().as_deref(), Some("jwt-ada-2"));
    assert_eq!(store.load().unwrap().refresh_token, "refresh-ada-2");
    assert!(auth.current_user().is_some());
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let server = MockServer::start_async().await;
    // Already inside the refresh margin
    mock_password_sign_in(&server, 30).await;
    mock_profile_upsert(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "refresh_token");
            then.status(400).json_body(json!({ "error_description": "Invalid Refresh Token" }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let auth = AuthContext::init(platform(&server), SessionStore::new(&path)).await;
    let mut states = auth.subscribe();
    auth.sign_in("ada@example.com", "Sup3r$ecret").await.unwrap();

    timeout(Duration::from_secs(5), async {
        while *states.borrow_and_update() != AuthState::SignedOut {
            states.changed().await.unwrap();
        }
    })
    .await
    .expect("session was never dropped");

    assert!(auth.session().is_none());
    assert!(auth.platform().access_token().is_none());
    assert!(!path.exists());
}
