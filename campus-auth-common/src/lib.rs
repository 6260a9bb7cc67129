//! campus-auth Common Types
//!
//! Shared data model used by the auth façade and its provider adapters.

pub mod credentials;
pub mod session;
pub mod user;

pub use credentials::{LoginCredentials, SignupCredentials};
pub use session::{AuthEvent, ProviderUser, Session};
pub use user::{ProfileRow, Role, User};
