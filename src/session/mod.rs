//! Chat Session
//!
//! The coordinator that owns one user's view of the shared chat:
//!
//! - **Identity**: bootstrapped once at start; readiness gates the feed and sending
//! - **Feed**: subscribed after the identity is ready, re-subscribed when the
//!   identity changes, released on shutdown
//! - **Send**: appends straight to the store; the message shows up in the feed
//!   only when the store pushes the next snapshot
//!
//! # Architecture
//!
//! ```text
//! IdentityService ──┐
//!                   ├─► events (mpsc) ─► dispatch task ─► watch<BootstrapState>
//! RemoteStore ──────┘                    (one handler      watch<Arc<FeedView>>
//!                                         at a time)
//! ```
//!
//! The rendering side reads the two watch channels and calls [`ChatSession::send`]
//! (usually through a [`Composer`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use rtchat::{ChatSession, Config, MemoryIdentityService, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = ChatSession::start(
//!         &config,
//!         Arc::new(MemoryIdentityService::new()),
//!         Arc::new(MemoryStore::new()),
//!     );
//!
//!     let me = session.wait_ready().await?;
//!     session.send("hello").await?;
//!
//!     let mut feed = session.watch_feed();
//!     feed.changed().await?;
//!     for message in feed.borrow().iter() {
//!         println!("{} {}: {}", me.id == message.sender_id, message.sender_id, message.text);
//!     }
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

mod composer;
mod dispatch;

pub use composer::Composer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use dispatch::{spawn_identity_listener, SessionCore, SessionEvent};
use crate::config::Config;
use crate::error::{ChatError, ChatResult};
use crate::feed::{FeedHealth, FeedSynchronizer, FeedView};
use crate::identity::{BootstrapState, IdentityBootstrap, IdentityService, SessionIdentity};
use crate::store::{CollectionPath, NewMessage, RemoteStore};

/// Result of a send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The store accepted the message under this document id
    Sent { id: String },
    /// Blank text; nothing was sent
    Skipped,
}

/// Handle to a running chat session
pub struct ChatSession {
    store: Arc<dyn RemoteStore>,
    path: CollectionPath,
    state: watch::Receiver<BootstrapState>,
    feed: watch::Receiver<Arc<FeedView>>,
    health: watch::Receiver<FeedHealth>,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    /// Start a session: bootstrap the identity, then follow the message feed
    ///
    /// Returns immediately; use [`wait_ready`](Self::wait_ready) or
    /// [`watch_state`](Self::watch_state) to follow the bootstrap. Must be
    /// called from within a tokio runtime.
    pub fn start(
        config: &Config,
        identity_service: Arc<dyn IdentityService>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        let path = config.collection_path();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let bootstrap = IdentityBootstrap::new();
        let feed = FeedSynchronizer::new(config.feed.pending_order);
        let state = bootstrap.watch();
        let feed_rx = feed.watch();
        let health = feed.watch_health();

        // Registered before sign-in so no change notification is missed
        let listener = spawn_identity_listener(identity_service.watch(), events_tx.clone());

        let core = SessionCore::new(
            bootstrap,
            feed,
            Arc::clone(&store),
            path.clone(),
            events_tx.clone(),
            Arc::clone(&closed),
            listener,
        );
        let token = config.app.initial_auth_token.clone();
        let task = tokio::spawn(core.run(identity_service, token, events_rx));

        tracing::info!(path = %path, "Chat session started");

        Self {
            store,
            path,
            state,
            feed: feed_rx,
            health,
            events: events_tx,
            closed,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn collection_path(&self) -> &CollectionPath {
        &self.path
    }

    /// Current bootstrap state
    pub fn state(&self) -> BootstrapState {
        self.state.borrow().clone()
    }

    /// Whether input should be enabled; always false once shut down
    pub fn is_ready(&self) -> bool {
        !self.is_closed() && self.state.borrow().is_ready()
    }

    /// Identity the session currently acts as
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Latest ordered feed view
    pub fn current_view(&self) -> Arc<FeedView> {
        Arc::clone(&self.feed.borrow())
    }

    /// Receiver notified on every new feed view
    pub fn watch_feed(&self) -> watch::Receiver<Arc<FeedView>> {
        self.feed.clone()
    }

    /// Receiver notified on every bootstrap state change
    pub fn watch_state(&self) -> watch::Receiver<BootstrapState> {
        self.state.clone()
    }

    /// Subscription error bookkeeping; `stale` is set while the shown view
    /// predates the latest error
    pub fn feed_health(&self) -> FeedHealth {
        self.health.borrow().clone()
    }

    pub fn watch_feed_health(&self) -> watch::Receiver<FeedHealth> {
        self.health.clone()
    }

    /// Wait until the bootstrap has either produced an identity or failed
    pub async fn wait_ready(&self) -> ChatResult<SessionIdentity> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }

        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| matches!(s, BootstrapState::Ready(_) | BootstrapState::Failed(_)))
            .await
            .map_err(|_| ChatError::Closed)?;

        match &*settled {
            BootstrapState::Ready(_) if self.is_closed() => Err(ChatError::Closed),
            BootstrapState::Ready(identity) => Ok(identity.clone()),
            BootstrapState::Failed(reason) => Err(ChatError::Bootstrap(reason.clone())),
            _ => Err(ChatError::Closed),
        }
    }

    /// Append a message to the shared collection
    ///
    /// Blank text is skipped without contacting the store. The feed is not
    /// touched here; the message appears once the store publishes it.
    pub async fn send(&self, text: &str) -> ChatResult<SendOutcome> {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring blank message");
            return Ok(SendOutcome::Skipped);
        }
        if self.is_closed() {
            return Err(ChatError::Closed);
        }

        let sender_id = match self.state.borrow().identity() {
            Some(identity) => identity.id.clone(),
            None => return Err(ChatError::NotReady),
        };

        match self
            .store
            .append(&self.path, NewMessage::new(sender_id.clone(), text))
            .await
        {
            Ok(id) => {
                tracing::info!(message_id = %id, sender_id = %sender_id, "Message sent");
                Ok(SendOutcome::Sent { id })
            }
            Err(e) => {
                tracing::error!(error = %e, sender_id = %sender_id, "Error sending message");
                Err(ChatError::Send(e))
            }
        }
    }

    /// Release the identity listener and the feed subscription
    ///
    /// Idempotent. Once this returns, no further state or feed updates are
    /// published.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Shutdown);

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Session task ended abnormally");
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Shutdown);
    }
}
