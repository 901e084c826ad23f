use std::{sync::Arc, time::Duration};

use fitsync::{
    backend::InMemoryAuthBackend,
    callback::{CallbackConfig, CallbackError, CallbackHandler, CallbackSuccess, FlowType},
};
use tokio::time::Instant;

const CALLBACK_URL: &str = "https://app.example.com/auth/callback";

fn handler(auth: &Arc<InMemoryAuthBackend>) -> CallbackHandler {
    CallbackHandler::new(auth.clone(), CallbackConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_existing_session_completes_quickly() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    auth.restore_session(auth.issue_session("u1"));

    let outcome = handler(&auth).handle(CALLBACK_URL).await;
    assert!(matches!(outcome.result, Ok(CallbackSuccess::Existing { .. })));
    assert_eq!(outcome.session().unwrap().user_id, "u1");
    assert_eq!(outcome.destination.as_deref(), Some("/"));
    assert!(outcome.elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_late_signed_in_event_completes_flow() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    {
        let auth = auth.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            auth.sign_in_as("u1");
        });
    }

    let outcome = handler(&auth).handle(CALLBACK_URL).await;
    assert!(matches!(
        outcome.result,
        Ok(CallbackSuccess::SignedInByEvent { .. })
    ));
    assert_eq!(outcome.session().unwrap().user_id, "u1");
    assert!(outcome.elapsed >= Duration::from_secs(4));
    assert!(outcome.elapsed < Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_nothing_happens_times_out_at_bound() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let started = Instant::now();

    let outcome = handler(&auth).handle(CALLBACK_URL).await;
    assert!(matches!(
        outcome.result,
        Err(CallbackError::RedirectTimeout { timeout_ms: 15_000 })
    ));
    assert!(outcome.result.as_ref().unwrap_err().is_timeout());
    assert_eq!(outcome.destination.as_deref(), Some("/login"));
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_custom_timeout() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let config = CallbackConfig::default().with_timeout(Duration::from_secs(2));

    let outcome = CallbackHandler::new(auth, config).handle(CALLBACK_URL).await;
    assert!(matches!(
        outcome.result,
        Err(CallbackError::RedirectTimeout { timeout_ms: 2_000 })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_missing_access_token_fails_immediately() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let url = format!("{CALLBACK_URL}?next=plans&refresh_token=r-123&type=signup");

    let outcome = handler(&auth).handle(&url).await;
    let err = outcome.result.as_ref().unwrap_err();
    assert!(err.is_malformed());
    assert_eq!(outcome.elapsed, Duration::ZERO);
    assert_eq!(outcome.destination.as_deref(), Some("/login"));
    assert!(!outcome.sanitized_url.contains("r-123"));
    assert_eq!(outcome.sanitized_url, format!("{CALLBACK_URL}?next=plans"));
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_fails_immediately() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let url = format!(
        "{CALLBACK_URL}#error=access_denied&error_description=Email+link+is+invalid+or+has+expired"
    );

    let outcome = handler(&auth).handle(&url).await;
    match outcome.result {
        Err(CallbackError::Provider { code, description }) => {
            assert_eq!(code, "access_denied");
            assert_eq!(description, "Email link is invalid or has expired");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
    assert_eq!(outcome.elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_not_a_url_is_malformed() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let outcome = handler(&auth).handle("not a url").await;
    assert!(outcome.result.unwrap_err().is_malformed());
    assert_eq!(outcome.sanitized_url, "");
}

#[tokio::test]
async fn test_redirect_tokens_are_exchanged() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let (access, refresh) = auth.issue_redirect_tokens("u1");
    let url = format!("{CALLBACK_URL}#access_token={access}&refresh_token={refresh}&type=signup");

    let outcome = handler(&auth).handle(&url).await;
    match &outcome.result {
        Ok(CallbackSuccess::Established { session, flow }) => {
            assert_eq!(session.user_id, "u1");
            assert_eq!(*flow, Some(FlowType::Signup));
        }
        other => panic!("expected an established session, got {other:?}"),
    }
    assert_eq!(outcome.destination.as_deref(), Some("/"));
    assert_eq!(auth.current_session().unwrap().user_id, "u1");
    assert!(!outcome.sanitized_url.contains(&access));
    assert!(!outcome.sanitized_url.contains(&refresh));
}

#[tokio::test]
async fn test_recovery_link_goes_to_reset_page() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let (access, refresh) = auth.issue_redirect_tokens("u1");
    let url = format!("{CALLBACK_URL}?type=recovery#access_token={access}&refresh_token={refresh}");

    let outcome = handler(&auth).handle(&url).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.destination.as_deref(), Some("/reset-password"));
}

#[tokio::test]
async fn test_rejected_tokens_fail_establishment() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let url = format!("{CALLBACK_URL}#access_token=forged&refresh_token=forged");

    let outcome = handler(&auth).handle(&url).await;
    assert!(matches!(
        outcome.result,
        Err(CallbackError::EstablishFailed { .. })
    ));
    assert_eq!(outcome.destination.as_deref(), Some("/login"));
    assert!(auth.current_session().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_signed_out_while_waiting() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    {
        let auth = auth.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            auth.emit(fitsync::backend::AuthEvent::signed_out());
        });
    }

    let outcome = handler(&auth).handle(CALLBACK_URL).await;
    assert!(matches!(outcome.result, Err(CallbackError::SignedOut)));
    assert_eq!(outcome.destination.as_deref(), Some("/login"));
}
