//! Backend connectivity and session freshness checks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::config::ConnectionConfig;
use crate::identity::IdentityProvider;
use crate::profiles::ProfileStore;

/// A shared, cloneable connectivity check. Every clone resolves to the same
/// result.
pub type ConnectionCheck = Shared<BoxFuture<'static, bool>>;

/// Single-flight connectivity probe against the profile store.
///
/// Concurrent callers share one in-flight probe. A confirmed success is
/// cached for the lifetime of the monitor; a finished probe stays memoized for
/// `memo_ttl` and at most `max_attempts` probes are ever issued.
pub struct ConnectionMonitor {
    profiles: Arc<dyn ProfileStore>,
    max_attempts: u32,
    memo_ttl: Duration,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    healthy: bool,
    attempts: u32,
    in_flight: Option<ConnectionCheck>,
    completed_at: Option<Instant>,
}

impl ConnectionMonitor {
    pub fn new(profiles: Arc<dyn ProfileStore>, config: &ConnectionConfig) -> Self {
        Self {
            profiles,
            max_attempts: config.max_attempts,
            memo_ttl: config.memo_ttl(),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.lock().healthy
    }

    pub fn test_connection(self: &Arc<Self>) -> ConnectionCheck {
        let mut state = self.lock();

        if state.healthy {
            return future::ready(true).boxed().shared();
        }

        if let Some(done) = state.completed_at {
            if done.elapsed() >= self.memo_ttl {
                state.in_flight = None;
                state.completed_at = None;
            }
        }

        if let Some(check) = &state.in_flight {
            return check.clone();
        }

        if state.attempts >= self.max_attempts {
            tracing::warn!(
                attempts = state.attempts,
                "Connection check attempts exhausted"
            );
            return future::ready(false).boxed().shared();
        }

        state.attempts += 1;
        let attempt = state.attempts;
        let monitor = Arc::clone(self);
        let check = async move { monitor.probe(attempt).await }.boxed().shared();
        state.in_flight = Some(check.clone());
        check
    }

    async fn probe(&self, attempt: u32) -> bool {
        let healthy = match self.profiles.probe().await {
            Ok(()) => {
                tracing::info!(attempt, "Backend connection confirmed");
                true
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Backend connection check failed");
                false
            }
        };

        let mut state = self.lock();
        state.healthy |= healthy;
        state.completed_at = Some(Instant::now());
        healthy
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Refresh the session when it expires within `window`.
///
/// Returns whether a valid session exists afterwards. Never fails.
pub async fn check_and_refresh_auth(
    identity: &dyn IdentityProvider,
    window: chrono::Duration,
) -> bool {
    let session = match identity.get_session().await {
        Ok(Some(session)) => session,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read session");
            return false;
        }
    };

    if !session.expires_within(window, chrono::Utc::now()) {
        return true;
    }

    tracing::debug!(user_id = %session.user.id, "Session close to expiry, refreshing");
    match identity.refresh_session().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(user_id = %session.user.id, error = %e, "Session refresh failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::test_util::{test_provider_user, test_session, MockIdentityProvider, MockProfileStore};
    use std::sync::atomic::Ordering;

    fn monitor_over(store: &Arc<MockProfileStore>) -> Arc<ConnectionMonitor> {
        Arc::new(ConnectionMonitor::new(
            store.clone(),
            &ConnectionConfig::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_probe() {
        let store = Arc::new(MockProfileStore::new());
        store.push_probe(Err(ProviderError::network("offline")));
        store.push_probe(Err(ProviderError::network("offline")));
        let monitor = monitor_over(&store);

        let first = monitor.test_connection();
        let second = monitor.test_connection();
        assert!(first.ptr_eq(&second));

        let (a, b) = tokio::join!(first, second);
        assert!(!a && !b);
        assert_eq!(store.probe_calls.load(Ordering::SeqCst), 1);

        // Still memoized right after completion.
        assert!(!monitor.test_connection().await);
        assert_eq!(store.probe_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!monitor.test_connection().await);
        assert_eq!(store.probe_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_cached() {
        let store = Arc::new(MockProfileStore::new());
        let monitor = monitor_over(&store);

        assert!(monitor.test_connection().await);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(monitor.test_connection().await);
        assert!(monitor.is_healthy());
        assert_eq!(store.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_capped() {
        let store = Arc::new(MockProfileStore::new());
        for _ in 0..4 {
            store.push_probe(Err(ProviderError::new("down").with_status(503)));
        }
        let monitor = monitor_over(&store);

        for _ in 0..4 {
            assert!(!monitor.test_connection().await);
            tokio::time::advance(Duration::from_secs(2)).await;
        }
        assert_eq!(store.probe_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refreshes_session_close_to_expiry() {
        let identity = MockIdentityProvider::new();
        let user = test_provider_user("u1", "ana@uni.edu", serde_json::json!({}));
        identity.set_session(Some(test_session(user, 120)));

        assert!(check_and_refresh_auth(&identity, chrono::Duration::seconds(300)).await);
        assert_eq!(identity.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_session_is_not_refreshed() {
        let identity = MockIdentityProvider::new();
        let user = test_provider_user("u1", "ana@uni.edu", serde_json::json!({}));
        identity.set_session(Some(test_session(user, 3600)));

        assert!(check_and_refresh_auth(&identity, chrono::Duration::seconds(300)).await);
        assert_eq!(identity.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_session_or_failed_refresh_is_false() {
        let identity = MockIdentityProvider::new();
        assert!(!check_and_refresh_auth(&identity, chrono::Duration::seconds(300)).await);

        let user = test_provider_user("u1", "ana@uni.edu", serde_json::json!({}));
        identity.set_session(Some(test_session(user, 10)));
        identity.fail_refresh(ProviderError::new("Invalid Refresh Token").with_status(400));
        assert!(!check_and_refresh_auth(&identity, chrono::Duration::seconds(300)).await);
        assert_eq!(identity.refresh_calls.load(Ordering::SeqCst), 1);
    }
}
