//! # rtchat
//!
//! Real-time chat client core: establishes a session identity, follows a
//! shared message collection in a hosted document store, and keeps a
//! consistently ordered feed for the UI to render.
//!
//! ## Features
//!
//! - **Identity bootstrap**: token or anonymous sign-in, with a local fallback
//!   id if the backing identity is lost
//! - **Ordered feed**: full-snapshot replacement, de-duplication by id, stable
//!   timestamp ordering with pending writes placed last
//! - **Single dispatch loop**: identity and snapshot events are handled one at a
//!   time, and late deliveries from released subscriptions are dropped
//! - **Pluggable backends**: `IdentityService` and `RemoteStore` traits with
//!   in-process implementations
//!
//! ## Modules
//!
//! - [`identity`]: Identity service contract and bootstrap state machine
//! - [`feed`]: Message records, ordering and the feed synchronizer
//! - [`store`]: Remote store contract and in-process store
//! - [`session`]: The coordinator tying identity, feed and sending together
//! - [`render`]: Display values for the feed
//! - [`config`]: TOML / environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtchat::{ChatSession, Composer, Config, MemoryIdentityService, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let session = ChatSession::start(
//!         &config,
//!         Arc::new(MemoryIdentityService::new()),
//!         Arc::new(MemoryStore::new()),
//!     );
//!
//!     // Input stays disabled until an identity exists
//!     let me = session.wait_ready().await?;
//!     println!("Your user id: {}", me.id);
//!
//!     let mut composer = Composer::new();
//!     composer.set_draft("Hello, world");
//!     composer.submit(&session).await?;
//!
//!     let view = session.current_view();
//!     println!("{} messages", view.len());
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod identity;
pub mod render;
pub mod session;
pub mod store;

// Re-export top-level types for convenience
pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};

pub use error::{ChatError, ChatResult};

pub use feed::{
    FeedHealth, FeedSynchronizer, FeedView, MessageRecord, PendingOrder, RecordError,
    ServerTimestamp,
};

pub use identity::{
    BootstrapState, Identity, IdentityBootstrap, IdentityError, IdentityOrigin, IdentityService,
    MemoryIdentityService, SessionIdentity,
};

pub use render::{render_feed, MessageView};

pub use session::{ChatSession, Composer, SendOutcome};

pub use store::{
    CollectionPath, MemoryStore, NewMessage, RemoteDocument, RemoteStore, StoreError,
    Subscription,
};
