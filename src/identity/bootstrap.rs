//! Identity Bootstrap
//!
//! Produces exactly one session identity and publishes readiness. A failed
//! bootstrap is terminal: there is no retry and no fallback identity.
//!
//! Once ready, identity change notifications are applied on top:
//! a different identity replaces the current one, and a sign-out is replaced
//! by a locally generated id so the session stays usable. The local id has no
//! link to the previous one; messages sent earlier keep the old sender id.

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use super::{Identity, IdentityService};
use crate::error::{ChatError, ChatResult};

/// How the current session identity was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityOrigin {
    /// Exchanged from a pre-issued credential token
    Token,
    /// Anonymous sign-in
    Anonymous,
    /// Delivered by a later identity change notification
    Remote,
    /// Generated locally after the backing identity was lost
    LocalFallback,
}

/// The identity the session acts as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub id: String,
    pub origin: IdentityOrigin,
}

impl SessionIdentity {
    pub fn new(id: impl Into<String>, origin: IdentityOrigin) -> Self {
        Self {
            id: id.into(),
            origin,
        }
    }

    /// Fresh random identity with no backing account
    pub fn local() -> Self {
        Self::new(Uuid::new_v4().to_string(), IdentityOrigin::LocalFallback)
    }
}

/// Bootstrap state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    Authenticating,
    Ready(SessionIdentity),
    Failed(String),
}

impl BootstrapState {
    pub fn is_ready(&self) -> bool {
        matches!(self, BootstrapState::Ready(_))
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        match self {
            BootstrapState::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BootstrapState::Uninitialized => "uninitialized",
            BootstrapState::Authenticating => "authenticating",
            BootstrapState::Ready(_) => "ready",
            BootstrapState::Failed(_) => "failed",
        }
    }
}

/// Result of applying an identity change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    /// Same identity as before
    Unchanged,
    /// The session now acts as a different identity
    Replaced(SessionIdentity),
    /// Not ready, so the notification was not applied
    Ignored,
}

/// Drives the bootstrap state machine and publishes its state
pub struct IdentityBootstrap {
    state: BootstrapState,
    publisher: watch::Sender<BootstrapState>,
}

impl Default for IdentityBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityBootstrap {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(BootstrapState::Uninitialized);
        Self {
            state: BootstrapState::Uninitialized,
            publisher,
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.state.identity()
    }

    /// Receiver that sees every state transition
    pub fn watch(&self) -> watch::Receiver<BootstrapState> {
        self.publisher.subscribe()
    }

    fn transition(&mut self, state: BootstrapState) {
        tracing::debug!(from = self.state.name(), to = state.name(), "Bootstrap transition");
        self.state = state;
        self.publisher.send_replace(self.state.clone());
    }

    /// Authenticate with `token` if present and non-blank, anonymously otherwise
    ///
    /// May only be called once.
    pub async fn run(
        &mut self,
        service: &dyn IdentityService,
        token: Option<&str>,
    ) -> ChatResult<SessionIdentity> {
        if self.state != BootstrapState::Uninitialized {
            return Err(ChatError::Bootstrap(format!(
                "bootstrap already {}",
                self.state.name()
            )));
        }

        self.transition(BootstrapState::Authenticating);

        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let result = match token {
            Some(token) => service
                .authenticate_with_token(token)
                .await
                .map(|identity| SessionIdentity::new(identity.uid, IdentityOrigin::Token)),
            None => service
                .authenticate_anonymously()
                .await
                .map(|identity| SessionIdentity::new(identity.uid, IdentityOrigin::Anonymous)),
        };

        match result {
            Ok(identity) => {
                tracing::info!(user_id = %identity.id, origin = ?identity.origin, "Session identity established");
                self.transition(BootstrapState::Ready(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                tracing::error!(error = %e, "Identity bootstrap failed");
                self.transition(BootstrapState::Failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Apply an identity change notification
    pub fn apply_change(&mut self, change: Option<Identity>) -> IdentityChange {
        let current = match &self.state {
            BootstrapState::Ready(identity) => identity,
            other => {
                tracing::debug!(state = other.name(), "Ignoring identity change before ready");
                return IdentityChange::Ignored;
            }
        };

        let next = match change {
            Some(identity) if identity.uid == current.id => return IdentityChange::Unchanged,
            Some(identity) => SessionIdentity::new(identity.uid, IdentityOrigin::Remote),
            None => {
                tracing::warn!(
                    previous = %current.id,
                    "Identity lost; continuing with a local anonymous id"
                );
                SessionIdentity::local()
            }
        };

        tracing::info!(user_id = %next.id, origin = ?next.origin, "Session identity replaced");
        self.transition(BootstrapState::Ready(next.clone()));
        IdentityChange::Replaced(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityError, MemoryIdentityService};

    #[tokio::test]
    async fn test_anonymous_bootstrap() {
        let service = MemoryIdentityService::new();
        let mut bootstrap = IdentityBootstrap::new();
        let rx = bootstrap.watch();

        let identity = bootstrap.run(&service, None).await.unwrap();

        assert_eq!(identity.origin, IdentityOrigin::Anonymous);
        assert!(!identity.id.is_empty());
        assert!(bootstrap.is_ready());
        assert_eq!(rx.borrow().identity(), Some(&identity));
    }

    #[tokio::test]
    async fn test_token_bootstrap() {
        let service = MemoryIdentityService::new().grant_token("secret", "alice");
        let mut bootstrap = IdentityBootstrap::new();

        let identity = bootstrap.run(&service, Some("secret")).await.unwrap();
        assert_eq!(identity, SessionIdentity::new("alice", IdentityOrigin::Token));
    }

    #[tokio::test]
    async fn test_blank_token_is_anonymous() {
        let service = MemoryIdentityService::new();
        let mut bootstrap = IdentityBootstrap::new();

        let identity = bootstrap.run(&service, Some("  ")).await.unwrap();
        assert_eq!(identity.origin, IdentityOrigin::Anonymous);
    }

    #[tokio::test]
    async fn test_invalid_token_fails_terminally() {
        let service = MemoryIdentityService::new();
        let mut bootstrap = IdentityBootstrap::new();

        let result = bootstrap.run(&service, Some("forged")).await;
        assert!(matches!(
            result,
            Err(ChatError::Identity(IdentityError::InvalidToken))
        ));
        assert!(matches!(bootstrap.state(), BootstrapState::Failed(_)));
        assert!(!bootstrap.is_ready());

        // No recovery path, including through change notifications
        let change = bootstrap.apply_change(Some(Identity::new("bob", false)));
        assert_eq!(change, IdentityChange::Ignored);
        assert!(!bootstrap.is_ready());
    }

    #[tokio::test]
    async fn test_unavailable_service_fails() {
        let service = MemoryIdentityService::new();
        service.set_unavailable(true);
        let mut bootstrap = IdentityBootstrap::new();

        assert!(bootstrap.run(&service, None).await.is_err());
        assert_eq!(bootstrap.state().name(), "failed");
    }

    #[tokio::test]
    async fn test_run_twice_rejected() {
        let service = MemoryIdentityService::new();
        let mut bootstrap = IdentityBootstrap::new();
        bootstrap.run(&service, None).await.unwrap();

        let result = bootstrap.run(&service, None).await;
        assert!(matches!(result, Err(ChatError::Bootstrap(_))));
        assert!(bootstrap.is_ready());
    }

    #[tokio::test]
    async fn test_sign_out_falls_back_to_local_identity() {
        let service = MemoryIdentityService::new();
        let mut bootstrap = IdentityBootstrap::new();
        let original = bootstrap.run(&service, None).await.unwrap();

        let change = bootstrap.apply_change(None);

        let replacement = match change {
            IdentityChange::Replaced(identity) => identity,
            other => panic!("Expected Replaced, got {:?}", other),
        };
        assert_ne!(replacement.id, original.id);
        assert_eq!(replacement.origin, IdentityOrigin::LocalFallback);
        assert!(bootstrap.is_ready());
    }

    #[tokio::test]
    async fn test_same_identity_change_is_unchanged() {
        let service = MemoryIdentityService::new().grant_token("t", "alice");
        let mut bootstrap = IdentityBootstrap::new();
        bootstrap.run(&service, Some("t")).await.unwrap();

        let change = bootstrap.apply_change(Some(Identity::new("alice", false)));
        assert_eq!(change, IdentityChange::Unchanged);
        assert_eq!(bootstrap.identity().unwrap().origin, IdentityOrigin::Token);
    }

    #[test]
    fn test_change_before_ready_ignored() {
        let mut bootstrap = IdentityBootstrap::new();
        assert_eq!(bootstrap.apply_change(None), IdentityChange::Ignored);
        assert_eq!(bootstrap.state(), &BootstrapState::Uninitialized);
    }
}
