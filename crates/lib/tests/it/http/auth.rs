use std::sync::{Arc, atomic::Ordering};

use fitsync::{
    SessionEngine,
    backend::{AuthBackend, AuthEventKind, HttpAuthBackend, HttpProfileStore},
    callback::{CallbackConfig, CallbackHandler, CallbackSuccess},
    constants::INVALID_ACCOUNT_MESSAGE,
    types::{Credentials, Session},
};

use super::mock::MockServer;
use crate::helpers::*;

fn engine_over(server: &MockServer) -> (Arc<HttpAuthBackend>, SessionEngine) {
    let auth = Arc::new(HttpAuthBackend::new(server.config()).unwrap());
    let profiles = Arc::new(
        HttpProfileStore::new(server.config())
            .unwrap()
            .with_auth(auth.clone()),
    );
    let engine = SessionEngine::builder(auth.clone(), profiles).mount().unwrap();
    (auth, engine)
}

#[tokio::test]
async fn test_password_sign_in_end_to_end() {
    let server = MockServer::start().await;
    server.state.add_account("coach@example.com", "secret", "u1");
    server.state.add_profile("u1", "trainer");
    let (_auth, engine) = engine_over(&server);

    let identity = engine
        .sign_in_with_password("coach@example.com", "secret")
        .await
        .unwrap();
    assert!(identity.is_privileged);
    let user = identity.user.unwrap();
    assert_eq!(user.email.as_deref(), Some("coach@example.com"));
    assert_eq!(user.display_name().as_deref(), Some("Robin Vale"));

    // The profile request carried the user's token, not the API key
    let session = engine.session().unwrap();
    assert_eq!(
        server.state.profile_bearers.lock().unwrap().last(),
        Some(&session.access_token().to_string())
    );
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = MockServer::start().await;
    server.state.add_account("coach@example.com", "secret", "u1");
    let (_auth, engine) = engine_over(&server);

    let err = engine
        .sign_in_with_password("coach@example.com", "guess")
        .await
        .unwrap_err();
    assert!(err.is_rejected());
    assert!(err.to_string().contains("Invalid login credentials"));
}

#[tokio::test]
async fn test_account_without_profile_is_revoked() {
    let server = MockServer::start().await;
    server.state.add_account("ghost@example.com", "secret", "ghost");
    let (auth, engine) = engine_over(&server);

    let err = engine
        .sign_in_with_password("ghost@example.com", "secret")
        .await
        .unwrap_err();
    assert!(err.is_invalid_account());
    eventually(|| server.state.logouts.load(Ordering::SeqCst) == 1).await;
    assert!(auth.get_current_session().await.unwrap().is_none());
    settle().await;
    assert_eq!(engine.identity().error.as_deref(), Some(INVALID_ACCOUNT_MESSAGE));
}

#[tokio::test]
async fn test_sign_out_calls_logout() {
    let server = MockServer::start().await;
    server.state.add_account("coach@example.com", "secret", "u1");
    server.state.add_profile("u1", "user");
    let (auth, engine) = engine_over(&server);

    engine
        .sign_in_with_password("coach@example.com", "secret")
        .await
        .unwrap();
    engine.sign_out().await.unwrap();
    assert_eq!(server.state.logouts.load(Ordering::SeqCst), 1);
    assert!(auth.get_current_session().await.unwrap().is_none());
    assert!(engine.identity().user.is_none());
}

#[tokio::test]
async fn test_callback_establishes_session_over_http() {
    let server = MockServer::start().await;
    server.state.add_account("new@example.com", "secret", "u1");
    server.state.add_profile("u1", "admin");
    let (access, refresh) = server.state.issue_tokens("u1");
    let (_auth, engine) = engine_over(&server);
    engine.wait_until_initialized().await.unwrap();

    let handler = CallbackHandler::for_engine(&engine, CallbackConfig::default());
    let outcome = handler
        .handle(&format!(
            "https://app.example.com/auth/callback#access_token={access}&refresh_token={refresh}&type=magiclink"
        ))
        .await;
    match &outcome.result {
        Ok(CallbackSuccess::Established { session, .. }) => {
            assert_eq!(session.user_id, "u1");
            assert_eq!(session.email.as_deref(), Some("new@example.com"));
        }
        other => panic!("expected an established session, got {other:?}"),
    }
    assert!(wait_settled(&engine, "u1").await.is_privileged);
}

#[tokio::test]
async fn test_expired_session_is_refreshed_on_lookup() {
    let server = MockServer::start().await;
    server.state.add_account("coach@example.com", "secret", "u1");
    let (access, refresh) = server.state.issue_tokens("u1");
    let auth = HttpAuthBackend::new(server.config()).unwrap();
    auth.restore_session(Session::new(
        "u1",
        Credentials::new(access.clone(), refresh),
        0,
        None,
    ));
    let mut events = auth.subscribe();
    assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::InitialSession);

    let session = auth.get_current_session().await.unwrap().unwrap();
    assert_eq!(session.user_id, "u1");
    assert_ne!(session.access_token(), access);
    assert!(session.expires_at > 0);
    assert_eq!(server.state.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::TokenRefreshed);
}

#[tokio::test]
async fn test_rejected_refresh_token_signs_out() {
    let server = MockServer::start().await;
    let auth = HttpAuthBackend::new(server.config()).unwrap();
    auth.restore_session(Session::new(
        "u1",
        Credentials::new("stale-access", "revoked-refresh"),
        0,
        None,
    ));
    let mut events = auth.subscribe();
    events.recv().await.unwrap();

    assert!(auth.get_current_session().await.unwrap().is_none());
    assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::SignedOut);
}

#[tokio::test]
async fn test_reset_and_update_password() {
    let server = MockServer::start().await;
    server.state.add_account("coach@example.com", "secret", "u1");
    server.state.add_profile("u1", "user");
    let (_auth, engine) = engine_over(&server);

    engine
        .reset_password_for_email("coach@example.com", Some("https://app.example.com/reset-password"))
        .await
        .unwrap();
    assert_eq!(
        server.state.recoveries.lock().unwrap().as_slice(),
        &[(
            "coach@example.com".to_string(),
            Some("https://app.example.com/reset-password".to_string())
        )]
    );

    engine
        .sign_in_with_password("coach@example.com", "secret")
        .await
        .unwrap();
    engine.update_password("n3w-secret").await.unwrap();
    assert_eq!(server.state.password_updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let auth = HttpAuthBackend::new(fitsync::backend::HttpBackendConfig::new(
        format!("http://{addr}/auth/v1"),
        format!("http://{addr}/rest/v1"),
        "anon-key",
    ))
    .unwrap();
    let err = auth
        .sign_in_with_password("coach@example.com", "secret")
        .await
        .unwrap_err();
    assert!(err.is_transport_error());
}
