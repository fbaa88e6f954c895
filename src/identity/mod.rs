//! Session Identity
//!
//! Establishes who the local user is before any feed or send operation runs.
//!
//! - [`IdentityService`]: the external identity provider (token exchange,
//!   anonymous sign-in, change notifications)
//! - [`IdentityBootstrap`]: one-shot `Uninitialized → Authenticating → Ready | Failed`
//!   state machine, plus handling of later identity changes
//! - [`MemoryIdentityService`]: in-process provider for the terminal client and tests

mod bootstrap;
mod memory;

pub use bootstrap::{
    BootstrapState, IdentityBootstrap, IdentityChange, IdentityOrigin, SessionIdentity,
};
pub use memory::MemoryIdentityService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Identity issued by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub uid: String,
    /// Whether the identity came from anonymous sign-in
    pub anonymous: bool,
}

impl Identity {
    pub fn new(uid: impl Into<String>, anonymous: bool) -> Self {
        Self {
            uid: uid.into(),
            anonymous,
        }
    }
}

/// Receiver of identity change notifications; `None` means signed out
pub type IdentityListener = broadcast::Receiver<Option<Identity>>;

/// External identity provider
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Exchange a pre-issued credential token for an identity
    async fn authenticate_with_token(&self, token: &str) -> Result<Identity, IdentityError>;

    /// Request a fresh anonymous identity
    async fn authenticate_anonymously(&self) -> Result<Identity, IdentityError>;

    /// Register for identity change notifications
    fn watch(&self) -> IdentityListener;
}

/// Errors from the identity service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid credential token")]
    InvalidToken,

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}
