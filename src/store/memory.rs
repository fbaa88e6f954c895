//! In-process Store
//!
//! A [`RemoteStore`] that keeps collections in memory and pushes full
//! snapshots to subscribers over tokio channels. Behaves like a hosted store
//! with local latency compensation: an append is published once with the
//! timestamp still pending, then again after the server timestamp is assigned.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{
    is_server_timestamp, CollectionPath, NewMessage, RemoteDocument, RemoteStore, SnapshotResult,
    StoreError, Subscription, SubscriptionId,
};
use crate::feed::ServerTimestamp;

/// Configuration for the in-process store
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Publish a pending snapshot before the server timestamp is assigned
    pub latency_compensation: bool,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            latency_compensation: true,
        }
    }
}

/// Counters describing store activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Documents across all collections
    pub documents: usize,
    /// Subscriptions currently open
    pub subscribers: usize,
    /// Subscriptions opened since creation
    pub subscriptions_opened: u64,
    /// Successful appends since creation
    pub appends: u64,
}

/// In-memory document store with push subscriptions
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    config: MemoryStoreConfig,
}

#[derive(Default)]
struct StoreInner {
    collections: HashMap<CollectionPath, Vec<RemoteDocument>>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    write_failure: Option<StoreError>,
    subscriptions_opened: u64,
    appends: u64,
}

struct Subscriber {
    path: CollectionPath,
    sender: mpsc::UnboundedSender<SnapshotResult>,
}

impl StoreInner {
    fn snapshot(&self, path: &CollectionPath) -> Vec<RemoteDocument> {
        self.collections.get(path).cloned().unwrap_or_default()
    }

    /// Send the current snapshot of `path` to its subscribers, pruning the
    /// ones whose receiver is gone
    fn publish(&mut self, path: &CollectionPath) {
        let snapshot = self.snapshot(path);
        self.deliver(path, Ok(snapshot));
    }

    fn deliver(&mut self, path: &CollectionPath, result: SnapshotResult) {
        let mut dead = Vec::new();
        let mut sent = 0;

        for (id, subscriber) in self.subscribers.iter().filter(|(_, s)| &s.path == path) {
            if subscriber.sender.send(result.clone()).is_ok() {
                sent += 1;
            } else {
                dead.push(id.clone());
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
            tracing::debug!(subscription_id = %id, "Pruned closed subscription");
        }

        tracing::trace!(path = %path, subscribers = sent, "Published snapshot");
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            config,
        }
    }

    /// Insert or replace a document by id and publish the collection
    pub async fn insert_document(&self, path: &CollectionPath, document: RemoteDocument) {
        let mut inner = self.inner.write().await;
        let collection = inner.collections.entry(path.clone()).or_default();

        match collection.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => collection.push(document),
        }

        inner.publish(path);
    }

    /// Remove a document and publish the collection. Returns false if the
    /// document did not exist.
    pub async fn remove_document(&self, path: &CollectionPath, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = match inner.collections.get_mut(path) {
            Some(collection) => {
                let before = collection.len();
                collection.retain(|d| d.id != id);
                collection.len() != before
            }
            None => false,
        };

        if removed {
            inner.publish(path);
        }
        removed
    }

    /// Make every subsequent append fail with `error`; `None` accepts writes again
    pub async fn reject_writes(&self, error: Option<StoreError>) {
        self.inner.write().await.write_failure = error;
    }

    /// Push an error to every subscriber of `path`
    pub async fn fail_subscribers(&self, path: &CollectionPath, error: StoreError) {
        self.inner.write().await.deliver(path, Err(error));
    }

    /// Current documents of a collection, in insertion order
    pub async fn documents(&self, path: &CollectionPath) -> Vec<RemoteDocument> {
        self.inner.read().await.snapshot(path)
    }

    pub async fn stats(&self) -> MemoryStoreStats {
        let inner = self.inner.read().await;
        MemoryStoreStats {
            documents: inner.collections.values().map(Vec::len).sum(),
            subscribers: inner.subscribers.len(),
            subscriptions_opened: inner.subscriptions_opened,
            appends: inner.appends,
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn subscribe(&self, path: &CollectionPath) -> Result<Subscription, StoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();

        let mut inner = self.inner.write().await;
        let snapshot = inner.snapshot(path);
        // Receiver is alive, so the initial snapshot cannot fail to send
        let _ = sender.send(Ok(snapshot));

        inner.subscribers.insert(
            id.clone(),
            Subscriber {
                path: path.clone(),
                sender,
            },
        );
        inner.subscriptions_opened += 1;

        tracing::debug!(subscription_id = %id, path = %path, "Subscription opened");
        Ok(Subscription::new(id, receiver))
    }

    async fn unsubscribe(&self, id: &str) {
        if self.inner.write().await.subscribers.remove(id).is_some() {
            tracing::debug!(subscription_id = %id, "Subscription released");
        }
    }

    async fn append(
        &self,
        path: &CollectionPath,
        message: NewMessage,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(error) = &inner.write_failure {
            return Err(error.clone());
        }

        let id = Uuid::new_v4().simple().to_string();
        let requested = message.to_fields();

        if self.config.latency_compensation {
            let pending = resolve_server_timestamps(requested.clone(), &Value::Null);
            inner
                .collections
                .entry(path.clone())
                .or_default()
                .push(RemoteDocument::new(id.clone(), pending));
            inner.publish(path);
        }

        let timestamp = ServerTimestamp::now().to_value();
        let committed =
            RemoteDocument::new(id.clone(), resolve_server_timestamps(requested, &timestamp));
        let collection = inner.collections.entry(path.clone()).or_default();
        match collection.iter_mut().find(|d| d.id == id) {
            Some(existing) => *existing = committed,
            None => collection.push(committed),
        }

        inner.appends += 1;
        inner.publish(path);

        tracing::debug!(document_id = %id, path = %path, "Message appended");
        Ok(id)
    }
}

/// Replace every server-timestamp placeholder field with `resolved`
fn resolve_server_timestamps(mut data: Value, resolved: &Value) -> Value {
    if let Some(fields) = data.as_object_mut() {
        for value in fields.values_mut() {
            if is_server_timestamp(value) {
                *value = resolved.clone();
            }
        }
    }
    data
}
