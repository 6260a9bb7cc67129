use campus_auth::test_util::test_config;
use campus_auth::{
    AuthError, AuthService, Config, KeyValueStore, LocalStore, LoginCredentials, Role,
    SqliteStore,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STORAGE_KEY: &str = "campus-auth-token";

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = test_config(&server.uri());
    config.storage.database_path = dir.path().join("session.db").display().to_string();
    config.storage.local_path = Some(dir.path().join("local.json").display().to_string());
    config
}

fn token_body(user_id: &str, email: &str) -> serde_json::Value {
    json!({
        "access_token": "access-123",
        "refresh_token": "refresh-123",
        "token_type": "bearer",
        "expires_in": 3600,
        "user": {
            "id": user_id,
            "email": email,
            "user_metadata": { "name": "Ana Costa" },
            "created_at": "2024-01-10T09:00:00Z"
        }
    })
}

async fn mount_sign_in(server: &MockServer, user_id: &str, email: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "test-anon-key"))
        .and(body_partial_json(json!({ "email": email })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(user_id, email)))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_persists_session_to_both_stores_and_logout_clears_it() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir);

    mount_sign_in(&server, "auth-1", "ana@uni.edu").await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.auth-1"))
        .and(header("authorization", "Bearer access-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "auth-1",
            "email": "ana@uni.edu",
            "name": "Ana Costa",
            "role": "admin",
            "created_at": "2024-01-10T09:00:00Z",
            "last_active": "2024-01-11T09:00:00Z",
            "phone": "555-0101",
            "student_id": "S-42"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.auth-1"))
        .and(header("authorization", "Bearer access-123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(query_param("scope", "local"))
        .and(header("authorization", "Bearer access-123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let service = AuthService::from_config(&config).unwrap();
    let user = service
        .login(&LoginCredentials::new("ana@uni.edu", "secret123"))
        .await
        .unwrap();

    assert_eq!(user.id, "auth-1");
    assert_eq!(user.role, Role::Admin);
    assert_eq!(user.student_id.as_deref(), Some("S-42"));

    let durable = SqliteStore::new(&config.storage.database_path);
    let stored = durable.get(STORAGE_KEY).await.unwrap().unwrap();
    assert!(stored.contains("access-123"));
    let local_path = config.storage.local_path.clone().unwrap();
    let mirror = LocalStore::open(&local_path).unwrap();
    assert_eq!(mirror.get_sync(STORAGE_KEY).as_deref(), Some(stored.as_str()));

    let current = service.current_user().await.unwrap().unwrap();
    assert_eq!(current.id, "auth-1");

    service.logout().await.unwrap();
    assert_eq!(durable.get(STORAGE_KEY).await.unwrap(), None);
    assert_eq!(service.current_user().await.unwrap(), None);
}

#[tokio::test]
async fn test_bad_credentials_are_normalized() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = AuthService::from_config(&config_for(&server, &dir)).unwrap();
    let err = service
        .login(&LoginCredentials::new("ana@uni.edu", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::Provider("Invalid email or password".to_string()));
}

#[tokio::test]
async fn test_connection_check_hits_profile_table_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let service = AuthService::from_config(&config_for(&server, &dir)).unwrap();
    let (a, b) = tokio::join!(service.test_connection(), service.test_connection());
    assert!(a && b);
    assert!(service.test_connection().await);
}

#[tokio::test]
async fn test_reset_password_sends_redirect() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/v1/recover"))
        .and(query_param("redirect_to", "https://campus.test/reset-password"))
        .and(body_partial_json(json!({ "email": "ana@uni.edu" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let service = AuthService::from_config(&config_for(&server, &dir)).unwrap();
    service.reset_password("ana@uni.edu").await.unwrap();
}
