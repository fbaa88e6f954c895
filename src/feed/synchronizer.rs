//! Feed Synchronizer
//!
//! Turns snapshot notifications into published [`FeedView`]s. Every accepted
//! snapshot replaces the whole view; channel errors are logged and leave the
//! last good view in place.
//!
//! Each activation carries a generation number. Deliveries tagged with any
//! other generation, or arriving while inactive, belong to a subscription that
//! has already been released and are dropped.

use std::sync::Arc;
use tokio::sync::watch;

use super::order::PendingOrder;
use super::view::FeedView;
use crate::store::{RemoteDocument, StoreError};

/// Activation state of the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Inactive,
    Active { generation: u64 },
}

/// Subscription error bookkeeping, published next to the view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedHealth {
    /// Errors accepted since the synchronizer was created
    pub error_count: u64,
    /// Most recent accepted error
    pub last_error: Option<StoreError>,
    /// An error arrived after the view currently shown
    pub stale: bool,
}

/// Maintains the ordered feed view for one session
pub struct FeedSynchronizer {
    order: PendingOrder,
    state: FeedState,
    current: Arc<FeedView>,
    publisher: watch::Sender<Arc<FeedView>>,
    health: watch::Sender<FeedHealth>,
}

impl FeedSynchronizer {
    pub fn new(order: PendingOrder) -> Self {
        let current = Arc::new(FeedView::empty());
        let (publisher, _) = watch::channel(Arc::clone(&current));
        let (health, _) = watch::channel(FeedHealth::default());

        Self {
            order,
            state: FeedState::Inactive,
            current,
            publisher,
            health,
        }
    }

    /// Receiver that sees every published view
    pub fn watch(&self) -> watch::Receiver<Arc<FeedView>> {
        self.publisher.subscribe()
    }

    /// Receiver that sees every change to the error bookkeeping
    pub fn watch_health(&self) -> watch::Receiver<FeedHealth> {
        self.health.subscribe()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, FeedState::Active { .. })
    }

    /// Latest published view
    pub fn view(&self) -> Arc<FeedView> {
        Arc::clone(&self.current)
    }

    pub fn health(&self) -> FeedHealth {
        self.health.borrow().clone()
    }

    pub fn error_count(&self) -> u64 {
        self.health.borrow().error_count
    }

    pub fn last_error(&self) -> Option<StoreError> {
        self.health.borrow().last_error.clone()
    }

    /// Start accepting deliveries for `generation`
    pub fn activate(&mut self, generation: u64) {
        self.state = FeedState::Active { generation };
        tracing::debug!(generation, "Feed activated");
    }

    /// Stop accepting deliveries. Returns false if already inactive.
    pub fn release(&mut self) -> bool {
        match self.state {
            FeedState::Active { generation } => {
                self.state = FeedState::Inactive;
                tracing::debug!(generation, "Feed released");
                true
            }
            FeedState::Inactive => false,
        }
    }

    fn accepts(&self, generation: u64) -> bool {
        self.state == FeedState::Active { generation }
    }

    /// Replace the view with one built from `documents`
    ///
    /// Returns false if the delivery was stale and ignored.
    pub fn apply_snapshot(&mut self, generation: u64, documents: &[RemoteDocument]) -> bool {
        if !self.accepts(generation) {
            tracing::trace!(generation, state = ?self.state, "Dropping stale snapshot");
            return false;
        }

        let view = FeedView::from_snapshot(self.current.revision + 1, documents, self.order);
        tracing::debug!(
            revision = view.revision,
            messages = view.len(),
            pending = view.pending_count(),
            "Feed view updated"
        );

        self.current = Arc::new(view);
        self.publisher.send_replace(Arc::clone(&self.current));
        self.health.send_if_modified(|health| std::mem::replace(&mut health.stale, false));
        true
    }

    /// Record a channel error, keeping the current view
    ///
    /// Returns false if the delivery was stale and ignored.
    pub fn apply_error(&mut self, generation: u64, error: StoreError) -> bool {
        if !self.accepts(generation) {
            tracing::trace!(generation, error = %error, "Dropping stale subscription error");
            return false;
        }

        tracing::error!(
            error = %error,
            revision = self.current.revision,
            "Error fetching messages; keeping last view"
        );
        self.health.send_modify(|health| {
            health.error_count += 1;
            health.last_error = Some(error);
            health.stale = true;
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, sender: &str, text: &str, seconds: Option<i64>) -> RemoteDocument {
        let timestamp = match seconds {
            Some(s) => json!({"seconds": s, "nanoseconds": 0}),
            None => serde_json::Value::Null,
        };
        RemoteDocument::new(id, json!({"senderId": sender, "text": text, "timestamp": timestamp}))
    }

    fn scenario_snapshot() -> Vec<RemoteDocument> {
        vec![doc("a", "u1", "hi", Some(5)), doc("b", "u2", "yo", Some(2))]
    }

    #[test]
    fn test_snapshot_produces_ordered_view() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        feed.activate(1);

        assert!(feed.apply_snapshot(1, &scenario_snapshot()));
        assert_eq!(feed.view().ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_last_snapshot_wins() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        feed.activate(1);

        feed.apply_snapshot(1, &scenario_snapshot());
        feed.apply_snapshot(1, &[doc("c", "u3", "new", Some(1))]);

        let expected = FeedView::from_snapshot(0, &[doc("c", "u3", "new", Some(1))], PendingOrder::Last);
        assert_eq!(feed.view().messages, expected.messages);
        assert_eq!(feed.view().ids(), vec!["c"]);
    }

    #[test]
    fn test_identical_snapshot_is_idempotent() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        feed.activate(1);

        feed.apply_snapshot(1, &scenario_snapshot());
        let first = feed.view();
        feed.apply_snapshot(1, &scenario_snapshot());
        let second = feed.view();

        assert_eq!(first.messages, second.messages);
        assert_eq!(second.revision, first.revision + 1);
    }

    #[test]
    fn test_error_keeps_last_view() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        feed.activate(1);
        feed.apply_snapshot(1, &scenario_snapshot());

        assert!(feed.apply_error(1, StoreError::PermissionDenied("messages".into())));

        assert_eq!(feed.view().ids(), vec!["b", "a"]);
        assert_eq!(feed.error_count(), 1);
        assert!(matches!(feed.last_error(), Some(StoreError::PermissionDenied(_))));
        assert!(feed.health().stale);
    }

    #[test]
    fn test_snapshot_after_error_clears_stale() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        let health = feed.watch_health();
        feed.activate(1);
        feed.apply_snapshot(1, &scenario_snapshot());
        assert!(!health.has_changed().unwrap());

        feed.apply_error(1, StoreError::Unavailable("offline".into()));
        assert!(health.borrow().stale);

        feed.apply_snapshot(1, &[doc("c", "u3", "back", Some(9))]);
        let after = health.borrow().clone();
        assert!(!after.stale);
        assert_eq!(after.error_count, 1);
        assert_eq!(after.last_error, Some(StoreError::Unavailable("offline".into())));
    }

    #[test]
    fn test_stale_generation_dropped() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        feed.activate(1);
        feed.apply_snapshot(1, &scenario_snapshot());
        feed.activate(2);

        assert!(!feed.apply_snapshot(1, &[]));
        assert!(!feed.apply_error(1, StoreError::Closed));
        assert_eq!(feed.view().ids(), vec!["b", "a"]);
        assert_eq!(feed.error_count(), 0);
    }

    #[test]
    fn test_release_is_idempotent_and_blocks_delivery() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        feed.activate(1);

        assert!(feed.release());
        assert!(!feed.release());
        assert!(!feed.apply_snapshot(1, &scenario_snapshot()));
        assert!(feed.view().is_empty());
    }

    #[test]
    fn test_inactive_drops_snapshot() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        assert!(!feed.is_active());
        assert!(!feed.apply_snapshot(0, &scenario_snapshot()));
        assert!(feed.view().is_empty());
    }

    #[test]
    fn test_watchers_see_published_views() {
        let mut feed = FeedSynchronizer::new(PendingOrder::Last);
        let rx = feed.watch();
        feed.activate(1);
        feed.apply_snapshot(1, &scenario_snapshot());

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_pending_boundary_policies() {
        let documents = vec![
            doc("p", "u1", "sending", None),
            doc("big", "u2", "later", Some(1_000_000)),
            doc("one", "u3", "early", Some(1)),
        ];

        let mut last = FeedSynchronizer::new(PendingOrder::Last);
        last.activate(1);
        last.apply_snapshot(1, &documents);
        assert_eq!(last.view().ids(), vec!["one", "big", "p"]);

        let mut first = FeedSynchronizer::new(PendingOrder::First);
        first.activate(1);
        first.apply_snapshot(1, &documents);
        assert_eq!(first.view().ids(), vec!["p", "one", "big"]);
    }
}
