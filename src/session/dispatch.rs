//! Session dispatch loop
//!
//! All state changes of a session happen here, one event at a time. Identity
//! notifications and snapshot deliveries are forwarded into a single channel
//! by small relay tasks, so handlers never run concurrently with each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::feed::FeedSynchronizer;
use crate::identity::{
    Identity, IdentityBootstrap, IdentityChange, IdentityListener, IdentityService,
};
use crate::store::{
    CollectionPath, RemoteStore, SnapshotResult, Subscription, SubscriptionId,
};

/// Events handled by the dispatch loop
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// Identity service reported a change; `None` means signed out
    IdentityChanged(Option<Identity>),
    /// Delivery on the feed subscription opened for `generation`
    Snapshot {
        generation: u64,
        result: SnapshotResult,
    },
    /// Stop the loop and release everything
    Shutdown,
}

struct ActiveSubscription {
    id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

/// State owned by the dispatch task
pub(crate) struct SessionCore {
    bootstrap: IdentityBootstrap,
    feed: FeedSynchronizer,
    store: Arc<dyn RemoteStore>,
    path: CollectionPath,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: Arc<AtomicBool>,
    listener: JoinHandle<()>,
    subscription: Option<ActiveSubscription>,
    generation: u64,
}

impl SessionCore {
    pub(crate) fn new(
        bootstrap: IdentityBootstrap,
        feed: FeedSynchronizer,
        store: Arc<dyn RemoteStore>,
        path: CollectionPath,
        events: mpsc::UnboundedSender<SessionEvent>,
        closed: Arc<AtomicBool>,
        listener: JoinHandle<()>,
    ) -> Self {
        Self {
            bootstrap,
            feed,
            store,
            path,
            events,
            closed,
            listener,
            subscription: None,
            generation: 0,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Bootstrap the identity, then handle events until shutdown
    ///
    /// A shutdown that arrives while sign-in is in flight abandons the
    /// sign-in, so a closed session never turns ready.
    pub(crate) async fn run(
        mut self,
        identity_service: Arc<dyn IdentityService>,
        token: Option<String>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let bootstrapped = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut events) => None,
            result = self.bootstrap.run(identity_service.as_ref(), token.as_deref()) => {
                Some(result)
            }
        };

        match bootstrapped {
            Some(Ok(_)) if !self.is_closed() => self.activate_feed().await,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Session not ready; sending stays disabled");
            }
            None => {
                tracing::info!(
                    state = self.bootstrap.state().name(),
                    "Shutdown during identity bootstrap"
                );
                self.teardown().await;
                return;
            }
        }

        while let Some(event) = events.recv().await {
            if self.is_closed() {
                break;
            }

            match event {
                SessionEvent::IdentityChanged(change) => self.handle_identity_change(change).await,
                SessionEvent::Snapshot { generation, result } => {
                    self.handle_snapshot(generation, result)
                }
                SessionEvent::Shutdown => break,
            }
        }

        self.teardown().await;
    }

    /// Open a fresh feed subscription for the current identity
    async fn activate_feed(&mut self) {
        if !self.bootstrap.is_ready() {
            return;
        }

        self.release_feed().await;
        self.generation += 1;
        let generation = self.generation;

        match self.store.subscribe(&self.path).await {
            Ok(subscription) => {
                let id = subscription.id().to_string();
                self.feed.activate(generation);
                let forwarder = spawn_snapshot_forwarder(subscription, generation, self.events.clone());

                tracing::info!(
                    subscription_id = %id,
                    generation,
                    path = %self.path,
                    "Feed subscription active"
                );
                self.subscription = Some(ActiveSubscription { id, forwarder });
            }
            Err(e) => {
                tracing::error!(error = %e, path = %self.path, "Failed to subscribe to messages");
            }
        }
    }

    async fn release_feed(&mut self) {
        self.feed.release();

        if let Some(active) = self.subscription.take() {
            active.forwarder.abort();
            self.store.unsubscribe(&active.id).await;
            tracing::debug!(subscription_id = %active.id, "Feed subscription released");
        }
    }

    fn handle_snapshot(&mut self, generation: u64, result: SnapshotResult) {
        match result {
            Ok(documents) => {
                self.feed.apply_snapshot(generation, &documents);
            }
            Err(e) => {
                self.feed.apply_error(generation, e);
            }
        }
    }

    async fn handle_identity_change(&mut self, change: Option<Identity>) {
        if let IdentityChange::Replaced(identity) = self.bootstrap.apply_change(change) {
            tracing::info!(user_id = %identity.id, "Re-subscribing feed for new identity");
            self.activate_feed().await;
        }
    }

    async fn teardown(mut self) {
        self.listener.abort();
        self.release_feed().await;
        tracing::info!(path = %self.path, "Chat session closed");
    }
}

/// Drain events until a shutdown request; nothing else can be applied before
/// the identity is ready
async fn wait_for_shutdown(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Shutdown => return,
            other => tracing::trace!(event = ?other, "Dropping event during bootstrap"),
        }
    }
}

/// Relay snapshot deliveries into the dispatch channel, tagged with `generation`
fn spawn_snapshot_forwarder(
    mut subscription: Subscription,
    generation: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = subscription.next().await {
            if events
                .send(SessionEvent::Snapshot { generation, result })
                .is_err()
            {
                break;
            }
        }
        tracing::trace!(generation, "Snapshot forwarder finished");
    })
}

/// Relay identity change notifications into the dispatch channel
pub(crate) fn spawn_identity_listener(
    mut listener: IdentityListener,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.recv().await {
                Ok(change) => {
                    if events.send(SessionEvent::IdentityChanged(change)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Identity listener lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
