//! Profile store over the hosted REST API (`/rest/v1/users`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campus_auth_common::{ProfileRow, Session};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::json;

use super::ProfileStore;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::storage::SessionStorage;

/// Code the REST layer returns when a single-object request matched no rows.
const NO_ROWS_CODE: &str = "PGRST116";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Requests run as the signed-in user when a session is stored under
/// `storage_key`, and as the anonymous role otherwise.
pub struct PostgrestProfileStore {
    http_client: Client,
    table_url: String,
    anon_key: String,
    storage_key: String,
    storage: Arc<dyn SessionStorage>,
}

impl PostgrestProfileStore {
    pub fn new(
        config: &ProviderConfig,
        storage_key: &str,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            table_url: format!("{}/rest/v1/users", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            storage_key: storage_key.to_string(),
            storage,
        })
    }

    async fn bearer_token(&self) -> String {
        self.storage
            .get_item(&self.storage_key)
            .await
            .and_then(|json| serde_json::from_str::<Session>(&json).ok())
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn request(&self, method: Method) -> RequestBuilder {
        let token = self.bearer_token().await;
        self.http_client
            .request(method, &self.table_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ProviderError::from_response(response).await)
        }
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn find(&self, user_id: &str) -> Result<Option<ProfileRow>, ProviderError> {
        let request = self
            .request(Method::GET)
            .await
            .query(&[("id", format!("eq.{}", user_id)), ("select", "*".to_string())])
            .header("Accept", SINGLE_OBJECT);

        match self.send(request).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(e) if e.code.as_deref() == Some(NO_ROWS_CODE) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, row: &ProfileRow) -> Result<ProfileRow, ProviderError> {
        let request = self
            .request(Method::POST)
            .await
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(row);

        Ok(self.send(request).await?.json().await?)
    }

    async fn touch_last_active(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ProviderError> {
        let request = self
            .request(Method::PATCH)
            .await
            .query(&[("id", format!("eq.{}", user_id))])
            .json(&json!({ "last_active": at }));

        self.send(request).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let request = self
            .request(Method::GET)
            .await
            .query(&[("select", "id"), ("limit", "1")]);

        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStore, MirroredStore};
    use crate::test_util::{test_provider_user, test_session, FailingStore};
    use campus_auth_common::Role;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "campus-auth-token";

    fn store_with(server: &MockServer, storage: Arc<dyn SessionStorage>) -> PostgrestProfileStore {
        PostgrestProfileStore::new(
            &ProviderConfig {
                url: server.uri(),
                anon_key: "anon-key".to_string(),
                request_timeout_secs: 5,
            },
            KEY,
            storage,
        )
        .unwrap()
    }

    fn session_storage() -> Arc<MirroredStore> {
        Arc::new(MirroredStore::new(
            Arc::new(FailingStore),
            Arc::new(LocalStore::in_memory()),
        ))
    }

    fn store_for(server: &MockServer) -> PostgrestProfileStore {
        store_with(server, session_storage())
    }

    #[tokio::test]
    async fn test_requests_use_anon_key_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).probe().await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_use_session_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/users"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer access-u1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let storage = session_storage();
        let session = test_session(
            test_provider_user("u1", "ana@uni.edu", json!({})),
            3600,
        );
        storage
            .set_item(KEY, &serde_json::to_string(&session).unwrap())
            .await;

        store_with(&server, storage)
            .touch_last_active("u1", Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_returns_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u1"))
            .and(header("accept", SINGLE_OBJECT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "email": "ana@uni.edu",
                "name": "Ana",
                "role": "admin",
                "created_at": "2024-01-01T00:00:00Z",
                "last_active": "2024-01-02T00:00:00Z",
                "phone": "555-0101",
                "student_id": null
            })))
            .mount(&server)
            .await;

        let row = store_for(&server).find("u1").await.unwrap().unwrap();
        assert_eq!(row.role, Role::Admin);
        assert_eq!(row.phone.as_deref(), Some("555-0101"));
    }

    #[tokio::test]
    async fn test_find_maps_no_rows_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned"
            })))
            .mount(&server)
            .await;

        assert!(store_for(&server).find("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_propagates_other_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "code": "XX000",
                "message": "internal error"
            })))
            .mount(&server)
            .await;

        let err = store_for(&server).find("u1").await.unwrap_err();
        assert_eq!(err.status, Some(500));
        assert_eq!(err.code.as_deref(), Some("XX000"));
    }

    #[tokio::test]
    async fn test_probe_hits_table_with_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).probe().await.unwrap();
    }

    #[tokio::test]
    async fn test_touch_last_active_patches_row() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).touch_last_active("u1", Utc::now()).await.unwrap();
    }
}
