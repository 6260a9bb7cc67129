use campus_auth_common::AuthEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Log every auth state change until the sender is dropped.
pub fn spawn_auth_event_logger(mut events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match &event {
                    AuthEvent::SignedIn { user_id } | AuthEvent::TokenRefreshed { user_id } => {
                        tracing::info!(event = %event, user_id = %user_id, "Auth state changed");
                    }
                    AuthEvent::SignedOut => {
                        tracing::info!(event = %event, "Auth state changed");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
