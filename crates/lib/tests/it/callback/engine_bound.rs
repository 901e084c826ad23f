use std::time::Duration;

use fitsync::{
    callback::{CallbackConfig, CallbackError, CallbackHandler},
    types::Role,
};

use crate::helpers::*;

const CALLBACK_URL: &str = "https://app.example.com/auth/callback";

#[tokio::test]
async fn test_engine_picks_up_established_session() {
    let fixture = Fixture::new().with_user("new@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    let (access, refresh) = fixture.auth.issue_redirect_tokens("u1");

    let handler = CallbackHandler::for_engine(&engine, CallbackConfig::default());
    let outcome = handler
        .handle(&format!(
            "{CALLBACK_URL}#access_token={access}&refresh_token={refresh}&type=signup"
        ))
        .await;
    assert!(outcome.is_success());

    let identity = wait_settled(&engine, "u1").await;
    assert!(identity.is_privileged);
    assert_eq!(fixture.profiles.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_cancels_pending_callback() {
    let fixture = Fixture::new();
    let engine = fixture.mount_ready().await;
    let handler = CallbackHandler::for_engine(&engine, CallbackConfig::default());

    {
        let engine = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            engine.unmount().await.unwrap();
        });
    }

    let outcome = handler.handle(CALLBACK_URL).await;
    assert!(matches!(outcome.result, Err(CallbackError::Cancelled)));
    assert!(outcome.result.as_ref().unwrap_err().is_cancelled());
    assert!(outcome.destination.is_none());
    assert!(outcome.elapsed < Duration::from_secs(15));
}

#[tokio::test]
async fn test_handler_for_unmounted_engine_is_cancelled() {
    let fixture = Fixture::new();
    let engine = fixture.mount_ready().await;
    engine.unmount().await.unwrap();

    let handler = CallbackHandler::for_engine(&engine, CallbackConfig::default());
    let outcome = handler.handle(CALLBACK_URL).await;
    assert!(matches!(outcome.result, Err(CallbackError::Cancelled)));
}
