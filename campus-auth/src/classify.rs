//! Classification of raw provider errors.
//!
//! The retry wrapper and the user message mapping both go through
//! [`classify`], so "transient" means the same thing everywhere.

use crate::error::ProviderError;

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Likely to succeed on retry: rate limiting, timeouts, network blips.
    Transient,
    /// Retrying will not help: bad credentials, duplicate registration, ...
    Permanent,
    /// The provider rejected the input itself.
    Validation,
}

pub fn classify(err: &ProviderError) -> ErrorKind {
    let message = err.message.to_ascii_lowercase();
    let code = err.code.as_deref().unwrap_or_default().to_ascii_lowercase();

    if err.status == Some(429)
        || message.contains("network")
        || code == "etimedout"
        || code.contains("timeout")
        || message.contains("timed out")
        || message.contains("timeout")
    {
        return ErrorKind::Transient;
    }

    if code == "validation_failed" {
        return ErrorKind::Validation;
    }

    if matches!(err.status, Some(400) | Some(422))
        && (message.contains("missing") || message.contains("invalid format"))
    {
        return ErrorKind::Validation;
    }

    ErrorKind::Permanent
}

pub fn is_duplicate_registration(err: &ProviderError) -> bool {
    let message = err.message.to_ascii_lowercase();
    message.contains("duplicate key") || message.contains("already registered")
}

/// Map a raw provider error to the text shown to the user.
pub fn user_message(err: &ProviderError, fallback: &str) -> String {
    let message = err.message.to_ascii_lowercase();

    if message.contains("invalid login credentials") {
        return "Invalid email or password".to_string();
    }
    if message.contains("email not confirmed") {
        return "Please verify your email address before logging in".to_string();
    }
    if is_duplicate_registration(err) {
        return "Email already registered".to_string();
    }
    if message.contains("password should be") {
        return "Password must be at least 6 characters".to_string();
    }

    match classify(err) {
        ErrorKind::Transient if err.status == Some(429) => {
            "Too many attempts. Please try again later".to_string()
        }
        ErrorKind::Transient => {
            "Network error. Please check your connection and try again".to_string()
        }
        // Provider validation text is not user-facing.
        ErrorKind::Validation | ErrorKind::Permanent => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let err = ProviderError::new("Too many requests").with_status(429);
        assert_eq!(classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn test_network_message_is_transient() {
        assert_eq!(
            classify(&ProviderError::new("NetworkError when attempting to fetch")),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_timeout_code_is_transient() {
        let err = ProviderError::new("socket hang up").with_code("ETIMEDOUT");
        assert_eq!(classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn test_bad_credentials_are_permanent() {
        let err = ProviderError::new("Invalid login credentials").with_status(400);
        assert_eq!(classify(&err), ErrorKind::Permanent);
    }

    #[test]
    fn test_validation_code() {
        let err = ProviderError::new("Unable to validate email address: invalid format")
            .with_status(400)
            .with_code("validation_failed");
        assert_eq!(classify(&err), ErrorKind::Validation);
    }

    #[test]
    fn test_user_message_mapping() {
        let bad = ProviderError::new("Invalid login credentials").with_status(400);
        assert_eq!(user_message(&bad, "x"), "Invalid email or password");

        let dup = ProviderError::new("duplicate key value violates unique constraint");
        assert_eq!(user_message(&dup, "x"), "Email already registered");

        let limited = ProviderError::new("slow down").with_status(429);
        assert_eq!(
            user_message(&limited, "x"),
            "Too many attempts. Please try again later"
        );

        let unknown = ProviderError::new("something odd").with_status(500);
        assert_eq!(user_message(&unknown, "Failed to sign in"), "Failed to sign in");
    }

    #[test]
    fn test_validation_errors_use_fallback() {
        let err = ProviderError::new("Unable to validate email address: invalid format")
            .with_status(400)
            .with_code("validation_failed");
        assert_eq!(
            user_message(&err, "Failed to send reset email"),
            "Failed to send reset email"
        );

        let missing = ProviderError::new("missing email or phone").with_status(422);
        assert_eq!(user_message(&missing, "Failed to sign in"), "Failed to sign in");
    }

    #[test]
    fn test_duplicate_registration_detection() {
        assert!(is_duplicate_registration(&ProviderError::new(
            "User already registered"
        )));
        assert!(!is_duplicate_registration(&ProviderError::new(
            "Invalid login credentials"
        )));
    }
}
