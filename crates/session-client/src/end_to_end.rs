//! Client, coordinator and token store driven against a mock HTTP server.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use session_auth::{FileTokenStore, SessionTokens, TokenStore};
use transport::{HttpTransport, RequestDescriptor};

use crate::{AuthClient, CoordinatorOptions, Error, SignOut};

struct Fixture {
    server: ServerGuard,
    client: Arc<AuthClient>,
    store: Arc<FileTokenStore>,
    sign_outs: Arc<AtomicUsize>,
    _dir: tempfile::TempDir,
}

async fn fixture(stored: Option<SessionTokens>) -> Fixture {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("session.json");
    let store = Arc::new(FileTokenStore::new(path));
    if let Some(tokens) = stored {
        store.save(&tokens).await.unwrap();
    }

    let transport = Arc::new(HttpTransport::new(
        reqwest::Client::new(),
        server.url(),
        Duration::from_secs(5),
    ));
    let client = Arc::new(AuthClient::new(
        transport,
        store.clone(),
        CoordinatorOptions::default(),
    ));
    client.restore_session().await.unwrap();

    let sign_outs = Arc::new(AtomicUsize::new(0));
    let counter = sign_outs.clone();
    let sign_out: Arc<dyn SignOut> = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    // Registration lives as long as the client; tests never eject.
    let _registration = client.register_token_manager(sign_out);

    Fixture {
        server,
        client,
        store,
        sign_outs,
        _dir: dir,
    }
}

#[tokio::test]
async fn expired_token_refreshes_once_and_replays() {
    let mut f = fixture(Some(SessionTokens::new("T1", "R1"))).await;
    let rejected = f
        .server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .with_body(r#"{"message":"token.expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = f
        .server
        .mock("POST", "/sessions/refresh-token")
        .match_body(Matcher::Json(json!({"refresh_token": "R1"})))
        .with_status(200)
        .with_body(r#"{"token":"T2","refresh_token":"R2"}"#)
        .expect(1)
        .create_async()
        .await;
    let replayed = f
        .server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"name":"Ana"}"#)
        .expect(1)
        .create_async()
        .await;

    let response = f.client.send(RequestDescriptor::get("/me")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), r#"{"name":"Ana"}"#);
    rejected.assert_async().await;
    refresh.assert_async().await;
    replayed.assert_async().await;
    assert_eq!(
        f.store.get().await.unwrap(),
        Some(SessionTokens::new("T2", "R2"))
    );
    assert_eq!(f.sign_outs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_refresh_token_signs_out_without_refresh_call() {
    let mut f = fixture(Some(SessionTokens::new("T1", ""))).await;
    let _rejected = f
        .server
        .mock("GET", "/me")
        .with_status(401)
        .with_body(r#"{"message":"token.invalid"}"#)
        .create_async()
        .await;
    let refresh = f
        .server
        .mock("POST", "/sessions/refresh-token")
        .expect(0)
        .create_async()
        .await;

    let err = f
        .client
        .send(RequestDescriptor::get("/me"))
        .await
        .unwrap_err();

    assert_eq!(err, Error::NoRefreshToken);
    assert_eq!(f.sign_outs.load(Ordering::SeqCst), 1);
    refresh.assert_async().await;
}

#[tokio::test]
async fn rejected_refresh_signs_out_and_keeps_stored_tokens() {
    let mut f = fixture(Some(SessionTokens::new("T1", "R1"))).await;
    let _rejected = f
        .server
        .mock("GET", "/me")
        .with_status(401)
        .with_body(r#"{"message":"token.expired"}"#)
        .create_async()
        .await;
    let _refresh = f
        .server
        .mock("POST", "/sessions/refresh-token")
        .with_status(401)
        .with_body(r#"{"message":"refresh token expired"}"#)
        .create_async()
        .await;

    let err = f
        .client
        .send(RequestDescriptor::get("/me"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RefreshFailed(_)), "got: {err:?}");
    assert_eq!(f.sign_outs.load(Ordering::SeqCst), 1);
    assert_eq!(
        f.store.get().await.unwrap(),
        Some(SessionTokens::new("T1", "R1"))
    );
}

#[tokio::test]
async fn non_auth_failure_message_reaches_caller() {
    let mut f = fixture(Some(SessionTokens::new("T1", "R1"))).await;
    let _mock = f
        .server
        .mock("POST", "/history")
        .with_status(400)
        .with_body(r#"{"message":"Exercise not found"}"#)
        .create_async()
        .await;

    let err = f
        .client
        .send(RequestDescriptor::post("/history", json!({"exercise_id": 99})))
        .await
        .unwrap_err();

    assert_eq!(err, Error::Server("Exercise not found".into()));
    assert_eq!(f.sign_outs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refreshed_token_is_used_by_later_requests() {
    let mut f = fixture(Some(SessionTokens::new("T1", "R1"))).await;
    let _rejected = f
        .server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .with_body(r#"{"message":"token.expired"}"#)
        .create_async()
        .await;
    let _refresh = f
        .server
        .mock("POST", "/sessions/refresh-token")
        .with_status(200)
        .with_body(r#"{"token":"T2","refresh_token":"R2"}"#)
        .expect(1)
        .create_async()
        .await;
    let _me = f
        .server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .create_async()
        .await;
    let history = f
        .server
        .mock("GET", "/history")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    f.client.send(RequestDescriptor::get("/me")).await.unwrap();
    f.client
        .send(RequestDescriptor::get("/history"))
        .await
        .unwrap();

    history.assert_async().await;
}
