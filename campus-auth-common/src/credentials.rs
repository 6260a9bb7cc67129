//! Transient credential inputs. Never persisted.

use serde::Deserialize;

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Email/password pair for signing in.
#[derive(Clone, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Names of required fields that are empty or whitespace.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.email) {
            missing.push("email");
        }
        if is_blank(&self.password) {
            missing.push("password");
        }
        missing
    }
}

/// Registration form. Every field is required.
#[derive(Clone, Deserialize)]
pub struct SignupCredentials {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub student_id: String,
}

impl SignupCredentials {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("email", &self.email),
            ("password", &self.password),
            ("name", &self.name),
            ("phone", &self.phone),
            ("student_id", &self.student_id),
        ]
        .into_iter()
        .filter(|(_, value)| is_blank(value))
        .map(|(field, _)| field)
        .collect()
    }
}

// Passwords stay out of logs.
impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for SignupCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("phone", &self.phone)
            .field("student_id", &self.student_id)
            .finish()
    }
}
