//! Auth façade over the identity provider and the profile table.

mod preferences;
mod service;

pub use preferences::{Preferences, REMEMBER_ME_KEY, SAVED_EMAIL_KEY};
pub use service::AuthService;
