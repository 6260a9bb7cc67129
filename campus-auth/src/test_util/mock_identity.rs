use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use campus_auth_common::{AuthEvent, Session};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{test_provider_user, test_session};
use crate::error::ProviderError;
use crate::identity::{IdentityProvider, SignOutScope, SignUpOutcome, SignUpRequest};

/// Scripted identity provider that counts every call.
pub struct MockIdentityProvider {
    sign_in_results: Mutex<VecDeque<Result<Session, ProviderError>>>,
    sign_up_error: Mutex<Option<ProviderError>>,
    sign_up_user_id: Mutex<Option<String>>,
    sign_out_error: Mutex<Option<ProviderError>>,
    reset_error: Mutex<Option<ProviderError>>,
    refresh_error: Mutex<Option<ProviderError>>,
    session: Mutex<Option<Session>>,
    sign_out_scopes: Mutex<Vec<SignOutScope>>,
    last_sign_up: Mutex<Option<SignUpRequest>>,
    last_redirect: Mutex<Option<String>>,
    pub sign_in_calls: AtomicU32,
    pub sign_up_calls: AtomicU32,
    pub sign_out_calls: AtomicU32,
    pub reset_calls: AtomicU32,
    pub get_session_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            sign_in_results: Mutex::new(VecDeque::new()),
            sign_up_error: Mutex::new(None),
            sign_up_user_id: Mutex::new(None),
            sign_out_error: Mutex::new(None),
            reset_error: Mutex::new(None),
            refresh_error: Mutex::new(None),
            session: Mutex::new(None),
            sign_out_scopes: Mutex::new(Vec::new()),
            last_sign_up: Mutex::new(None),
            last_redirect: Mutex::new(None),
            sign_in_calls: AtomicU32::new(0),
            sign_up_calls: AtomicU32::new(0),
            sign_out_calls: AtomicU32::new(0),
            reset_calls: AtomicU32::new(0),
            get_session_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            events,
        }
    }

    /// Queue the outcome of the next sign-in. When the queue is empty sign-in
    /// succeeds with a fresh user.
    pub fn push_sign_in(&self, result: Result<Session, ProviderError>) {
        self.sign_in_results.lock().unwrap().push_back(result);
    }

    /// Id assigned to the next signed-up user instead of a random one.
    pub fn assign_sign_up_id(&self, id: &str) {
        *self.sign_up_user_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn fail_sign_up(&self, err: ProviderError) {
        *self.sign_up_error.lock().unwrap() = Some(err);
    }

    pub fn fail_sign_out(&self, err: ProviderError) {
        *self.sign_out_error.lock().unwrap() = Some(err);
    }

    pub fn fail_reset(&self, err: ProviderError) {
        *self.reset_error.lock().unwrap() = Some(err);
    }

    pub fn fail_refresh(&self, err: ProviderError) {
        *self.refresh_error.lock().unwrap() = Some(err);
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn sign_out_scopes(&self) -> Vec<SignOutScope> {
        self.sign_out_scopes.lock().unwrap().clone()
    }

    pub fn last_sign_up(&self) -> Option<SignUpRequest> {
        self.last_sign_up.lock().unwrap().clone()
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.last_redirect.lock().unwrap().clone()
    }

    /// Calls across every identity operation.
    pub fn total_calls(&self) -> u32 {
        [
            &self.sign_in_calls,
            &self.sign_up_calls,
            &self.sign_out_calls,
            &self.reset_calls,
            &self.get_session_calls,
            &self.refresh_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Session, ProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.sign_in_results.lock().unwrap().pop_front();
        let session = match scripted {
            Some(result) => result?,
            None => test_session(
                test_provider_user(&Uuid::new_v4().to_string(), email, serde_json::json!({})),
                3600,
            ),
        };
        *self.session.lock().unwrap() = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn {
            user_id: session.user.id.clone(),
        });
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, ProviderError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_sign_up.lock().unwrap() = Some(request.clone());
        if let Some(err) = self.sign_up_error.lock().unwrap().clone() {
            return Err(err);
        }
        let id = self
            .sign_up_user_id
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user = test_provider_user(
            &id,
            &request.email,
            serde_json::Value::Object(request.metadata.clone()),
        );
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_out_scopes.lock().unwrap().push(scope);
        if let Some(err) = self.sign_out_error.lock().unwrap().clone() {
            return Err(err);
        }
        *self.session.lock().unwrap() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        _email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_redirect.lock().unwrap() = Some(redirect_to.to_string());
        match self.reset_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.lock().unwrap().clone())
    }

    async fn refresh_session(&self) -> Result<Session, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.refresh_error.lock().unwrap().clone() {
            return Err(err);
        }
        let current = self
            .session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::new("Auth session missing"))?;
        let refreshed = test_session(current.user, 3600);
        *self.session.lock().unwrap() = Some(refreshed.clone());
        let _ = self.events.send(AuthEvent::TokenRefreshed {
            user_id: refreshed.user.id.clone(),
        });
        Ok(refreshed)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
