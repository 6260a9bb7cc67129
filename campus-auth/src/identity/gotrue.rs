//! HTTP client for the hosted identity provider's `/auth/v1` API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campus_auth_common::{AuthEvent, ProviderUser, Session};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

use super::{IdentityProvider, SignOutScope, SignUpOutcome, SignUpRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::storage::SessionStorage;

/// Identity client that persists its session through [`SessionStorage`].
pub struct GoTrueClient {
    http_client: Client,
    auth_url: String,
    anon_key: String,
    storage_key: String,
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<AuthEvent>,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_in: self.expires_in,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Debug, Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a serde_json::Map<String, serde_json::Value>,
}

impl GoTrueClient {
    pub fn new(
        config: &ProviderConfig,
        storage_key: &str,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            http_client,
            auth_url: format!("{}/auth/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            storage_key: storage_key.to_string(),
            storage,
            events,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http_client
            .post(format!("{}/{}", self.auth_url, path))
            .header("apikey", &self.anon_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ProviderError::from_response(response).await)
        }
    }

    async fn persist(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(json) => self.storage.set_item(&self.storage_key, &json).await,
            Err(e) => tracing::error!(error = %e, "Failed to serialize session"),
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let request = self
            .post("token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));

        let token: TokenResponse = self.send(request).await?.json().await?;
        let session = token.into_session();

        self.persist(&session).await;
        self.emit(AuthEvent::SignedIn {
            user_id: session.user.id.clone(),
        });
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, ProviderError> {
        let body = SignUpBody {
            email: &request.email,
            password: &request.password,
            data: &request.metadata,
        };
        let value: serde_json::Value = self.send(self.post("signup").json(&body)).await?.json().await?;

        // Auto-confirmed projects answer with a full token response, the rest
        // with the bare user object.
        if value.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(value)
                .map_err(|e| ProviderError::new(format!("invalid response: {}", e)))?;
            let session = token.into_session();
            self.persist(&session).await;
            self.emit(AuthEvent::SignedIn {
                user_id: session.user.id.clone(),
            });
            Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user: ProviderUser = serde_json::from_value(value)
                .map_err(|e| ProviderError::new(format!("invalid response: {}", e)))?;
            Ok(SignUpOutcome {
                user,
                session: None,
            })
        }
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError> {
        if let Some(session) = self.get_session().await? {
            let request = self
                .post("logout")
                .query(&[("scope", scope.as_str())])
                .bearer_auth(&session.access_token);

            match self.send(request).await {
                Ok(_) => {}
                // Session already gone on the provider side.
                Err(e) if matches!(e.status, Some(401) | Some(403) | Some(404)) => {
                    tracing::debug!(error = %e, "Provider session already invalid");
                }
                Err(e) => return Err(e),
            }
        }

        self.storage.remove_item(&self.storage_key).await;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let request = self
            .post("recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        self.send(request).await?;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(json) = self.storage.get_item(&self.storage_key).await else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable stored session");
                self.storage.remove_item(&self.storage_key).await;
                Ok(None)
            }
        }
    }

    async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let current = self.get_session().await?.ok_or_else(|| {
            ProviderError::new("Auth session missing")
                .with_status(StatusCode::UNAUTHORIZED.as_u16())
                .with_code("session_missing")
        })?;

        let request = self
            .post("token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": current.refresh_token }));

        let token: TokenResponse = self.send(request).await?.json().await?;
        let session = token.into_session();

        self.persist(&session).await;
        self.emit(AuthEvent::TokenRefreshed {
            user_id: session.user.id.clone(),
        });
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
