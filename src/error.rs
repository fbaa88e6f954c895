//! Chat error types
//!
//! Crate-level error taxonomy. Each failure is terminal at the point where it
//! occurs: nothing here retries, and the only signal the rendering side gets is
//! the readiness flag plus whatever the caller chooses to show.

use thiserror::Error;

use crate::identity::IdentityError;
use crate::store::StoreError;

/// Errors surfaced by the chat session
#[derive(Error, Debug)]
pub enum ChatError {
    /// Identity exchange was rejected or the identity service was unreachable
    #[error("Identity failure: {0}")]
    Identity(#[from] IdentityError),

    /// The push channel for the message collection reported an error
    #[error("Subscription failure: {0}")]
    Subscription(StoreError),

    /// The store rejected a write
    #[error("Send failure: {0}")]
    Send(StoreError),

    /// An operation that needs a session identity ran before one was established
    #[error("Session is not ready")]
    NotReady,

    /// Bootstrap was driven through an invalid transition
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// The session has been shut down
    #[error("Session closed")]
    Closed,
}

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
