use fitsync::{
    backend::{HttpProfileStore, ProfileStore},
    types::Role,
};

use super::mock::{API_KEY, MockServer};

#[tokio::test]
async fn test_fetch_existing_profile() {
    let server = MockServer::start().await;
    server.state.add_profile("u1", "admin");
    let store = HttpProfileStore::new(server.config()).unwrap();

    let profile = store.fetch_profile("u1").await.unwrap().unwrap();
    assert_eq!(profile.user_id, "u1");
    assert_eq!(profile.role, Role::Admin);
    assert_eq!(profile.display_name.full(), "Robin Vale");
    assert!(profile.trainer_id.is_none());

    // Without an attached auth backend the API key doubles as the bearer
    assert_eq!(
        server.state.profile_bearers.lock().unwrap().as_slice(),
        &[API_KEY.to_string()]
    );
}

#[tokio::test]
async fn test_missing_row_is_none() {
    let server = MockServer::start().await;
    let store = HttpProfileStore::new(server.config()).unwrap();
    assert!(store.fetch_profile("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_is_not_a_missing_row() {
    let server = MockServer::start().await;
    server.state.add_profile("u1", "user");
    *server.state.fail_profiles.lock().unwrap() = true;
    let store = HttpProfileStore::new(server.config()).unwrap();

    let err = store.fetch_profile("u1").await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(err.to_string().contains("database is restarting"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = MockServer::start().await.config();
    config.profile_table = String::new();
    assert!(HttpProfileStore::new(config).is_err());
}
