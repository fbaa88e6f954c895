//! In-process Identity Service
//!
//! Issues random anonymous ids and accepts a fixed set of credential tokens.
//! Every sign-in, sign-out and user switch is broadcast to watchers, the same
//! way a hosted identity provider reports auth state changes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{Identity, IdentityError, IdentityListener, IdentityService};

/// Capacity of the change notification channel
const CHANGE_CAPACITY: usize = 64;

/// In-memory identity provider
pub struct MemoryIdentityService {
    /// Credential token → uid
    tokens: HashMap<String, String>,
    current: RwLock<Option<Identity>>,
    unavailable: AtomicBool,
    /// Sign-in delay in milliseconds
    latency_ms: AtomicU64,
    changes: broadcast::Sender<Option<Identity>>,
}

impl Default for MemoryIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityService {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            tokens: HashMap::new(),
            current: RwLock::new(None),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            changes,
        }
    }

    /// Builder method: accept `token` as a credential for `uid`
    pub fn grant_token(mut self, token: impl Into<String>, uid: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), uid.into());
        self
    }

    /// Make every sign-in fail as if the service could not be reached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every sign-in by `latency`, like a slow network round trip
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Currently signed-in identity
    pub async fn current(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }

    /// Sign the current user out and notify watchers
    pub async fn revoke(&self) {
        *self.current.write().await = None;
        tracing::info!("Identity revoked");
        self.notify(None);
    }

    /// Switch to another user and notify watchers
    pub async fn switch_user(&self, uid: impl Into<String>) -> Identity {
        let identity = Identity::new(uid, false);
        *self.current.write().await = Some(identity.clone());
        self.notify(Some(identity.clone()));
        identity
    }

    async fn round_trip(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn check_available(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(IdentityError::Unavailable("identity service offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn sign_in(&self, identity: Identity) -> Identity {
        *self.current.write().await = Some(identity.clone());
        self.notify(Some(identity.clone()));
        identity
    }

    fn notify(&self, change: Option<Identity>) {
        // No watchers is fine
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl IdentityService for MemoryIdentityService {
    async fn authenticate_with_token(&self, token: &str) -> Result<Identity, IdentityError> {
        self.round_trip().await;
        self.check_available()?;

        let uid = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)?;

        tracing::debug!(user_id = %uid, "Token sign-in");
        Ok(self.sign_in(Identity::new(uid, false)).await)
    }

    async fn authenticate_anonymously(&self) -> Result<Identity, IdentityError> {
        self.round_trip().await;
        self.check_available()?;

        let uid = Uuid::new_v4().simple().to_string();
        tracing::debug!(user_id = %uid, "Anonymous sign-in");
        Ok(self.sign_in(Identity::new(uid, true)).await)
    }

    fn watch(&self) -> IdentityListener {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_ids_are_unique() {
        let service = MemoryIdentityService::new();
        let a = service.authenticate_anonymously().await.unwrap();
        let b = service.authenticate_anonymously().await.unwrap();
        assert_ne!(a.uid, b.uid);
        assert!(a.anonymous);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let service = MemoryIdentityService::new().grant_token("good", "alice");
        assert_eq!(
            service.authenticate_with_token("bad").await,
            Err(IdentityError::InvalidToken)
        );
        assert_eq!(
            service.authenticate_with_token("good").await.unwrap().uid,
            "alice"
        );
    }

    #[tokio::test]
    async fn test_watchers_receive_changes() {
        let service = MemoryIdentityService::new().grant_token("good", "alice");
        let mut listener = service.watch();

        service.authenticate_with_token("good").await.unwrap();
        service.revoke().await;

        assert_eq!(listener.recv().await.unwrap().unwrap().uid, "alice");
        assert_eq!(listener.recv().await.unwrap(), None);
        assert!(service.current().await.is_none());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let service = MemoryIdentityService::new();
        service.set_unavailable(true);
        assert!(matches!(
            service.authenticate_anonymously().await,
            Err(IdentityError::Unavailable(_))
        ));

        service.set_unavailable(false);
        assert!(service.authenticate_anonymously().await.is_ok());
    }

    #[tokio::test]
    async fn test_latency_delays_sign_in() {
        let service = MemoryIdentityService::new();
        service.set_latency(Duration::from_millis(50));

        let started = tokio::time::Instant::now();
        service.authenticate_anonymously().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_switch_user_notifies_watchers() {
        let service = MemoryIdentityService::new();
        let mut listener = service.watch();

        let bob = service.switch_user("bob").await;

        assert_eq!(bob, Identity::new("bob", false));
        assert_eq!(listener.recv().await.unwrap(), Some(bob.clone()));
        assert_eq!(service.current().await, Some(bob));
    }
}
