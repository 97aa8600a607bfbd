//! Session manager with single-flight refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

/// What a successful handshake grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Opaque bearer or session token.
    Token(String),
    /// The provider validated the credentials but issues no token.
    Validated,
}

/// Result of one provider handshake.
#[derive(Debug, Clone)]
pub struct Credential {
    pub grant: Grant,
    /// Provider-supplied lifetime. `None` falls back to the configured TTL.
    pub lifetime: Option<Duration>,
}

impl Credential {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            grant: Grant::Token(token.into()),
            lifetime: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }
}

/// A grant with its expiry.
#[derive(Debug, Clone)]
pub struct Session {
    pub grant: Grant,
    pub expires_at: Instant,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        match &self.grant {
            Grant::Token(t) => Some(t.as_str()),
            Grant::Validated => None,
        }
    }

    fn is_current(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Provider-specific authentication handshake.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Provider name for logs and error messages.
    fn provider(&self) -> &'static str;

    async fn authenticate(&self) -> GatewayResult<Credential>;
}

type RefreshFuture = Shared<BoxFuture<'static, GatewayResult<Session>>>;

struct SessionState {
    current: Option<Session>,
    in_flight: Option<RefreshFuture>,
}

/// Owns one provider's session and de-duplicates concurrent refreshes.
pub struct SessionManager<A> {
    authenticator: Arc<A>,
    state: Arc<Mutex<SessionState>>,
    default_ttl: Duration,
    handshakes: Arc<AtomicU64>,
}

impl<A: Authenticator> SessionManager<A> {
    pub fn new(authenticator: A, default_ttl: Duration) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            state: Arc::new(Mutex::new(SessionState {
                current: None,
                in_flight: None,
            })),
            default_ttl,
            handshakes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Number of handshakes issued so far.
    pub fn handshake_count(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when a grant is held and has not expired.
    pub fn is_valid(&self) -> bool {
        self.lock().current.as_ref().is_some_and(Session::is_current)
    }

    /// Drop the cached session so the next call re-authenticates.
    pub fn invalidate(&self) {
        self.lock().current = None;
    }

    /// Return a valid session, refreshing it at most once for all concurrent callers.
    pub async fn ensure_authenticated(&self) -> GatewayResult<Session> {
        let refresh = {
            let mut state = self.lock();
            if let Some(session) = state.current.as_ref().filter(|s| s.is_current()) {
                return Ok(session.clone());
            }
            match &state.in_flight {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start_refresh();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };
        refresh.await
    }

    fn start_refresh(&self) -> RefreshFuture {
        let authenticator = self.authenticator.clone();
        let state = self.state.clone();
        let default_ttl = self.default_ttl;
        let handshakes = self.handshakes.clone();

        async move {
            let provider = authenticator.provider();
            handshakes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(provider, "Refreshing provider session");

            let result = authenticator.authenticate().await;
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            guard.in_flight = None;

            match result {
                Ok(credential) => {
                    let lifetime = credential.lifetime.unwrap_or(default_ttl);
                    if lifetime.is_zero() {
                        tracing::warn!(provider, "Provider issued an already expired session");
                    }
                    let session = Session {
                        grant: credential.grant,
                        expires_at: Instant::now() + lifetime,
                    };
                    guard.current = Some(session.clone());
                    metrics::record_auth_refresh(provider, "success");
                    tracing::info!(provider, lifetime_secs = lifetime.as_secs(), "Provider session refreshed");
                    Ok(session)
                }
                Err(error) => {
                    metrics::record_auth_refresh(provider, "failure");
                    tracing::error!(provider, error = %error, "Provider authentication failed");
                    Err(classify_auth_error(provider, error))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Transient failures keep their classification so callers may retry them.
fn classify_auth_error(provider: &str, error: GatewayError) -> GatewayError {
    match error {
        GatewayError::Network { .. }
        | GatewayError::UpstreamUnavailable { .. }
        | GatewayError::Authentication { .. } => error,
        other => GatewayError::Authentication {
            provider: provider.to_string(),
            message: other.to_string(),
        },
    }
}
