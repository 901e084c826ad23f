use fitsync::{
    DerivedIdentity,
    backend::{AuthBackend, AuthEvent},
    constants::INVALID_ACCOUNT_MESSAGE,
    engine::EngineNotice,
    types::Role,
};

use crate::helpers::*;

#[tokio::test]
async fn test_role_privilege_mapping() {
    for (role, privileged) in [(Role::User, false), (Role::Trainer, true), (Role::Admin, true)] {
        let fixture = Fixture::new().with_user("sam@example.com", "u1", role);
        let engine = fixture.mount_ready().await;
        fixture.auth.sign_in_as("u1");

        let identity = wait_settled(&engine, "u1").await;
        assert_eq!(identity.user.as_ref().unwrap().role(), Some(role));
        assert_eq!(identity.is_privileged, privileged, "role {role}");
        engine.unmount().await.unwrap();
    }
}

#[tokio::test]
async fn test_duplicate_event_resolves_once() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    let mut notices = engine.notices();

    let session = fixture.auth.sign_in_as("u1");
    fixture.auth.emit(AuthEvent::signed_in(session));
    wait_settled(&engine, "u1").await;
    settle().await;

    assert_eq!(fixture.profiles.fetch_count(), 1);
    assert!(matches!(
        notices.recv().await.unwrap(),
        EngineNotice::ProfileResolved { ref user_id, role: Role::Trainer, stale: false } if user_id == "u1"
    ));
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn test_sign_in_shows_loading_until_profile_arrives() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    assert!(engine.identity().user.is_none());

    fixture.profiles.pause();
    fixture.auth.sign_in_as("u1");

    let interim = wait_for_identity(&engine, |i| i.user_id() == Some("u1")).await;
    assert!(interim.loading);
    assert!(!interim.is_privileged);
    assert!(interim.user.as_ref().unwrap().profile.is_none());
    assert_eq!(
        interim.user.as_ref().unwrap().email.as_deref(),
        Some("sam@example.com")
    );

    fixture.profiles.resume();
    let settled = wait_settled(&engine, "u1").await;
    assert!(settled.is_privileged);
    assert_eq!(settled.user.unwrap().display_name().as_deref(), Some("Robin Vale"));
}

#[tokio::test]
async fn test_sign_in_revalidates_cached_role() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::User);
    let engine = fixture.mount_ready().await;
    fixture.auth.sign_in_as("u1");
    assert!(!wait_settled(&engine, "u1").await.is_privileged);

    // Promoted elsewhere while no engine was mounted; the cache still says "user"
    engine.unmount().await.unwrap();
    fixture.profiles.insert(profile("u1", Role::Trainer));
    fixture.auth.sign_out().await.unwrap();
    assert_eq!(fixture.profiles.fetch_count(), 1);

    let engine = fixture.mount_ready().await;
    fixture.profiles.pause();
    fixture.auth.sign_in_as("u1");

    // The cached copy renders immediately while the fetch is outstanding
    let tentative = wait_for_identity(&engine, |i| i.user_id() == Some("u1")).await;
    assert!(tentative.loading);
    assert_eq!(tentative.user.as_ref().unwrap().role(), Some(Role::User));

    fixture.profiles.resume();
    let settled = wait_settled(&engine, "u1").await;
    assert!(settled.is_privileged);
    assert_eq!(engine.cache().get("u1").unwrap().role, Role::Trainer);
}

#[tokio::test]
async fn test_token_refresh_does_not_fetch() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    fixture.auth.sign_in_as("u1");
    let before = wait_settled(&engine, "u1").await;
    assert_eq!(fixture.profiles.fetch_count(), 1);

    let refreshed = fixture.auth.refresh().unwrap();
    eventually(|| engine.session().as_ref() == Some(&refreshed)).await;

    assert_eq!(fixture.profiles.fetch_count(), 1);
    assert_eq!(engine.identity(), before);
}

#[tokio::test]
async fn test_token_refresh_after_restart_uses_cache() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Admin);
    let engine = fixture.mount_ready().await;
    fixture.auth.sign_in_as("u1");
    wait_settled(&engine, "u1").await;
    engine.unmount().await.unwrap();

    // Remount over the same cache with the session still live
    let engine = fixture.mount_ready().await;
    assert!(engine.identity().is_privileged);
    fixture.auth.refresh().unwrap();
    settle().await;

    // One fetch from the first sign-in; startup and refresh both hit the cache
    assert_eq!(fixture.profiles.fetch_count(), 1);
    assert!(engine.identity().is_privileged);
}

#[tokio::test]
async fn test_missing_profile_is_invalid_account() {
    let fixture = Fixture::new();
    fixture.auth.add_account("ghost@example.com", "password", "ghost");
    let engine = fixture.mount_ready().await;
    let mut notices = engine.notices();

    let err = engine
        .sign_in_with_password("ghost@example.com", "password")
        .await
        .unwrap_err();
    assert!(err.is_invalid_account());

    assert!(engine.identity().user.is_none());
    assert_eq!(engine.identity().error.as_deref(), Some(INVALID_ACCOUNT_MESSAGE));
    assert_eq!(
        notices.recv().await.unwrap(),
        EngineNotice::InvalidAccount {
            user_id: "ghost".to_string()
        }
    );

    // The backend session is revoked and the message survives the echo
    eventually(|| fixture.auth.current_session().is_none()).await;
    settle().await;
    assert_eq!(engine.identity().error.as_deref(), Some(INVALID_ACCOUNT_MESSAGE));

    // An explicit sign-out always ends clean
    engine.sign_out().await.unwrap();
    assert_eq!(engine.identity(), DerivedIdentity::anonymous());
}

#[tokio::test]
async fn test_missing_profile_drops_cached_copy() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    fixture.auth.sign_in_as("u1");
    wait_settled(&engine, "u1").await;
    assert!(engine.cache().get("u1").is_some());

    fixture.profiles.remove("u1");
    let err = engine.refresh_profile().await.unwrap_err();
    assert!(err.is_invalid_account());
    assert!(engine.cache().get("u1").is_none());
}

#[tokio::test]
async fn test_fetch_failure_without_cache_surfaces_error() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    fixture.profiles.set_offline(true);
    fixture.auth.sign_in_as("u1");

    let identity = wait_settled(&engine, "u1").await;
    assert!(identity.user.as_ref().unwrap().profile.is_none());
    assert!(!identity.is_privileged);
    assert!(identity.error.as_deref().unwrap().contains("offline"));

    // Still signed in; nothing was revoked
    assert!(engine.session().is_some());
    assert!(fixture.auth.current_session().is_some());
}

#[tokio::test]
async fn test_fetch_failure_with_cache_degrades_silently() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::Trainer);
    let engine = fixture.mount_ready().await;
    fixture.auth.sign_in_as("u1");
    wait_settled(&engine, "u1").await;
    fixture.auth.sign_out().await.unwrap();
    wait_for_identity(&engine, |i| i.user.is_none()).await;

    // Sign-out cleared the cache; put an entry back as a previous run would have left it
    fixture.seed_cache(profile("u1", Role::Trainer));

    let mut notices = engine.notices();
    fixture.profiles.set_offline(true);
    fixture.auth.sign_in_as("u1");

    let identity = wait_settled(&engine, "u1").await;
    assert!(identity.is_privileged);
    assert!(identity.error.is_none());
    assert_eq!(
        notices.recv().await.unwrap(),
        EngineNotice::ProfileResolved {
            user_id: "u1".to_string(),
            role: Role::Trainer,
            stale: true,
        }
    );
}

#[tokio::test]
async fn test_refresh_profile_picks_up_changes() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::User);
    let engine = fixture.mount_ready().await;
    fixture.auth.sign_in_as("u1");
    assert!(!wait_settled(&engine, "u1").await.is_privileged);

    fixture.profiles.insert(profile("u1", Role::Admin).with_trainer("t9"));
    let identity = engine.refresh_profile().await.unwrap();
    assert!(identity.is_privileged);
    assert_eq!(identity.user.unwrap().trainer_id(), Some("t9"));
    assert_eq!(fixture.profiles.fetch_count(), 2);
}

#[tokio::test]
async fn test_refresh_profile_requires_session() {
    let fixture = Fixture::new();
    let engine = fixture.mount_ready().await;
    let err = engine.refresh_profile().await.unwrap_err();
    assert!(matches!(
        err,
        fitsync::Error::Engine(fitsync::engine::EngineError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn test_update_password_requires_session() {
    let fixture = Fixture::new().with_user("sam@example.com", "u1", Role::User);
    let engine = fixture.mount_ready().await;
    assert!(engine.update_password("new-secret").await.is_err());

    fixture.auth.sign_in_as("u1");
    wait_settled(&engine, "u1").await;
    engine.update_password("new-secret").await.unwrap();

    // USER_UPDATED for the current user revalidates without changing who is signed in
    let identity = wait_settled(&engine, "u1").await;
    assert_eq!(identity.user_id(), Some("u1"));
    engine.sign_out().await.unwrap();
    assert!(
        engine
            .sign_in_with_password("sam@example.com", "new-secret")
            .await
            .is_ok()
    );
}
