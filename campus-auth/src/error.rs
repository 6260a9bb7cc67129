//! Error types for the auth client.

/// Raw failure reported by the identity provider or the profile store.
///
/// Never crosses the [`AuthService`](crate::AuthService) boundary; the façade
/// converts it into an [`AuthError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Provider error code (`ETIMEDOUT`, `PGRST116`, `validation_failed`, ...).
    pub code: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Transport failure that never produced a response.
    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self::new(format!("network error: {}", detail))
    }

    pub fn timeout(detail: impl std::fmt::Display) -> Self {
        Self::new(format!("request timed out: {}", detail)).with_code("ETIMEDOUT")
    }
}

impl ProviderError {
    /// Build an error from a non-success HTTP response.
    ///
    /// Both the auth and REST APIs put the text in one of `msg`, `message`,
    /// `error_description` or `error`, and the code in `error_code` or `code`.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body: serde_json::Value = response.json().await.unwrap_or_default();

        let message = ["msg", "message", "error_description", "error"]
            .iter()
            .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status));
        let code = ["error_code", "code"]
            .iter()
            .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string);

        Self {
            message,
            status: Some(status),
            code,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::timeout(&e)
        } else if e.is_decode() {
            ProviderError::new(format!("invalid response: {}", e))
        } else {
            ProviderError::network(&e)
        }
    }
}

/// Normalized error returned by every public façade operation.
///
/// `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Failed to sign out")]
    SignOutFailed,

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    Profile(String),
}

impl AuthError {
    pub fn missing_fields(fields: &[&str]) -> Self {
        AuthError::Validation(format!("Missing required fields: {}", fields.join(", ")))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
