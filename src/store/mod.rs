//! Remote Store
//!
//! The contract with the hosted document database that holds the shared
//! message collection:
//!
//! - **subscribe**: push-based delivery of the *complete* current snapshot of a
//!   collection every time it changes (not a diff)
//! - **append**: add a new message; the store assigns the document id and the
//!   server timestamp
//! - **unsubscribe**: release a subscription; no snapshot is delivered for it
//!   afterwards
//!
//! Durability, replication and fan-out all live behind this trait. The crate
//! ships [`MemoryStore`], an in-process implementation used by the terminal
//! client and by the tests.

mod document;
mod memory;

pub use document::{is_server_timestamp, server_timestamp, NewMessage, RemoteDocument};
pub use memory::{MemoryStore, MemoryStoreConfig, MemoryStoreStats};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Unique identifier for an open subscription
pub type SubscriptionId = String;

/// One delivery on a subscription: a full snapshot or a channel error
pub type SnapshotResult = Result<Vec<RemoteDocument>, StoreError>;

/// Path of a watched collection
///
/// Collections are namespaced by application id under a fixed public-data
/// segment, e.g. `/artifacts/my-app/public/data/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Build the public message collection path for an application
    pub fn public_messages(app_id: &str) -> Self {
        Self(format!("/artifacts/{}/public/data/messages", app_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open snapshot subscription
///
/// Dropping the subscription closes its channel; the store prunes it on the
/// next publication. Call [`RemoteStore::unsubscribe`] to release it eagerly.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<SnapshotResult>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, receiver: mpsc::UnboundedReceiver<SnapshotResult>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next snapshot or error; `None` once the store has released
    /// the subscription
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }
}

/// Contract with the hosted document store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Open a snapshot subscription on a collection
    ///
    /// Implementations deliver the current snapshot right away, then one full
    /// snapshot per change.
    async fn subscribe(&self, path: &CollectionPath) -> Result<Subscription, StoreError>;

    /// Release a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: &str);

    /// Append a message and return the id the store assigned to it
    async fn append(&self, path: &CollectionPath, message: NewMessage)
        -> Result<String, StoreError>;
}

/// Errors reported by the remote store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Access rules rejected the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The subscription channel was closed by the store
    #[error("Subscription closed")]
    Closed,
}
