//! Session lifecycle for one external system.
//!
//! `NO_SESSION -> AUTHENTICATING -> ACTIVE -> (EXPIRED | REJECTED) -> AUTHENTICATING`.
//! The state lock is held for the whole login so renewal is single-flight:
//! callers arriving during a login wait for it and reuse its session.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mailquote_core::ports::ExternalError;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    /// The system refused the session or the credentials (HTTP 401).
    #[error("session rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    External(#[from] ExternalError),
}

/// What a successful login hands back.
pub struct SessionGrant {
    pub session_id: SecretString,
    pub lifetime: Duration,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self) -> Result<SessionGrant, SessionError>;
}

/// A live session as handed to callers. `generation` increases with every login.
#[derive(Clone)]
pub struct Session {
    id: SecretString,
    generation: u64,
}

impl Session {
    pub fn id(&self) -> &str {
        self.id.expose_secret()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &"[redacted]")
            .field("generation", &self.generation)
            .finish()
    }
}

struct ActiveSession {
    session: Session,
    expires_at: Instant,
}

#[derive(Default)]
struct SessionState {
    active: Option<ActiveSession>,
    generation: u64,
}

pub struct SessionManager {
    system: String,
    authenticator: Arc<dyn Authenticator>,
    safety_margin: Duration,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        system: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            system: system.into(),
            authenticator,
            safety_margin,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// Returns the active session, logging in first when there is none or it expired.
    pub async fn session(&self) -> Result<Session, ExternalError> {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.as_ref() {
            if Instant::now() < active.expires_at {
                return Ok(active.session.clone());
            }
            debug!(
                event_name = "erp.session.expired",
                system = %self.system,
                generation = active.session.generation,
                "session expired"
            );
        }

        let grant = match self.authenticator.login().await {
            Ok(grant) => grant,
            Err(error) => {
                state.active = None;
                warn!(
                    event_name = "erp.session.login_failed",
                    system = %self.system,
                    error = %error,
                    "login failed"
                );
                return Err(self.to_external(error));
            }
        };

        state.generation += 1;
        let session = Session { id: grant.session_id, generation: state.generation };
        let expires_at = Instant::now() + grant.lifetime.saturating_sub(self.safety_margin);
        state.active = Some(ActiveSession { session: session.clone(), expires_at });

        info!(
            event_name = "erp.session.renewed",
            system = %self.system,
            generation = session.generation,
            lifetime_secs = grant.lifetime.as_secs(),
            "session renewed"
        );
        Ok(session)
    }

    /// Drops the active session if it is still the one that was rejected.
    pub async fn mark_rejected(&self, session: &Session) {
        let mut state = self.state.lock().await;
        let current = state.active.as_ref().map(|active| active.session.generation);
        if current == Some(session.generation) {
            state.active = None;
            warn!(
                event_name = "erp.session.rejected",
                system = %self.system,
                generation = session.generation,
                "session rejected; next call re-authenticates"
            );
        }
    }

    /// Runs `operation` with a session. A rejection triggers one re-login and
    /// exactly one retry; a second rejection is an authentication failure.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ExternalError>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let session = self.session().await?;
        match operation(session.clone()).await {
            Err(SessionError::Rejected(_)) => {}
            other => return other.map_err(|error| self.to_external(error)),
        }

        self.mark_rejected(&session).await;
        let renewed = self.session().await?;
        match operation(renewed.clone()).await {
            Err(SessionError::Rejected(message)) => {
                self.mark_rejected(&renewed).await;
                error!(
                    event_name = "erp.session.rejected_after_renewal",
                    system = %self.system,
                    generation = renewed.generation,
                    "session rejected again after re-authentication"
                );
                Err(ExternalError::Authentication { system: self.system.clone(), message })
            }
            other => other.map_err(|error| self.to_external(error)),
        }
    }

    fn to_external(&self, error: SessionError) -> ExternalError {
        match error {
            SessionError::Rejected(message) => {
                ExternalError::Authentication { system: self.system.clone(), message }
            }
            SessionError::External(error) => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use mailquote_core::ports::ExternalError;

    use super::{Authenticator, SessionError, SessionGrant, SessionManager};

    struct CountingAuthenticator {
        logins: AtomicUsize,
        lifetime: Duration,
        reject_login: bool,
    }

    impl CountingAuthenticator {
        fn new(lifetime: Duration) -> Arc<Self> {
            Arc::new(Self { logins: AtomicUsize::new(0), lifetime, reject_login: false })
        }

        fn logins(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn login(&self) -> Result<SessionGrant, SessionError> {
            let attempt = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.reject_login {
                return Err(SessionError::Rejected("bad password".to_string()));
            }
            Ok(SessionGrant {
                session_id: format!("session-{attempt}").into(),
                lifetime: self.lifetime,
            })
        }
    }

    fn manager(authenticator: Arc<CountingAuthenticator>) -> SessionManager {
        SessionManager::new("catalog", authenticator, Duration::ZERO)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let authenticator = CountingAuthenticator::new(Duration::from_secs(1800));
        let manager = manager(authenticator.clone());

        let (first, second, third) =
            tokio::join!(manager.session(), manager.session(), manager.session());

        assert_eq!(authenticator.logins(), 1);
        for session in [first, second, third] {
            let session = session.map_err(|error| error.to_string());
            assert_eq!(session.map(|s| s.id().to_string()), Ok("session-1".to_string()));
        }
    }

    #[tokio::test]
    async fn expired_session_forces_a_new_login() {
        let authenticator = CountingAuthenticator::new(Duration::ZERO);
        let manager = manager(authenticator.clone());

        let first = manager.session().await.map(|s| s.generation());
        let second = manager.session().await.map(|s| s.generation());

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(authenticator.logins(), 2);
    }

    #[tokio::test]
    async fn rejected_call_is_retried_once_after_relogin() {
        let authenticator = CountingAuthenticator::new(Duration::from_secs(1800));
        let manager = manager(authenticator.clone());
        let attempts = AtomicUsize::new(0);

        let outcome = manager
            .call(|session| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(SessionError::Rejected("401".to_string()))
                    } else {
                        Ok(session.id().to_string())
                    }
                }
            })
            .await;

        assert_eq!(outcome, Ok("session-2".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(authenticator.logins(), 2);
    }

    #[tokio::test]
    async fn second_rejection_is_an_authentication_failure() {
        let authenticator = CountingAuthenticator::new(Duration::from_secs(1800));
        let manager = manager(authenticator.clone());
        let attempts = AtomicUsize::new(0);

        let outcome: Result<(), ExternalError> = manager
            .call(|_session| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(SessionError::Rejected("401".to_string())) }
            })
            .await;

        assert!(matches!(outcome, Err(ExternalError::Authentication { ref system, .. })
            if system == "catalog"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(authenticator.logins(), 2);
    }

    #[tokio::test]
    async fn concurrent_rejections_of_one_session_renew_once() {
        let authenticator = CountingAuthenticator::new(Duration::from_secs(1800));
        let manager = manager(authenticator.clone());

        let priced_line = || {
            manager.call(|session| async move {
                if session.generation() == 1 {
                    Err(SessionError::Rejected("401".to_string()))
                } else {
                    Ok(session.generation())
                }
            })
        };
        let (first, second) = tokio::join!(priced_line(), priced_line());

        assert_eq!(first, Ok(2));
        assert_eq!(second, Ok(2));
        assert_eq!(authenticator.logins(), 2);
    }

    #[tokio::test]
    async fn rejected_login_is_fatal_and_not_retryable() {
        let authenticator = Arc::new(CountingAuthenticator {
            logins: AtomicUsize::new(0),
            lifetime: Duration::from_secs(1800),
            reject_login: true,
        });
        let manager = manager(authenticator);

        let error = manager.session().await;
        assert!(matches!(error, Err(ref error @ ExternalError::Authentication { .. })
            if !error.is_retryable()));
    }

    #[tokio::test]
    async fn transport_failures_pass_through_untouched() {
        let authenticator = CountingAuthenticator::new(Duration::from_secs(1800));
        let manager = manager(authenticator);

        let outcome: Result<(), ExternalError> = manager
            .call(|_session| async {
                Err(SessionError::External(ExternalError::Timeout {
                    system: "catalog".to_string(),
                    timeout_secs: 20,
                }))
            })
            .await;

        assert!(matches!(outcome, Err(ExternalError::Timeout { timeout_secs: 20, .. })));
    }
}
