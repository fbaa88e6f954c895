//! Message Feed
//!
//! Reconciles the store's unordered snapshot feed into a stable, ordered view:
//!
//! - **record**: `MessageRecord` and `ServerTimestamp`, mapped from store documents
//! - **order**: timestamp ordering with a stable tie-break and the pending-write policy
//! - **view**: `FeedView`, rebuilt from each full snapshot
//! - **synchronizer**: `FeedSynchronizer`, which publishes views and guards
//!   against deliveries from released subscriptions
//!
//! # Data Flow
//!
//! ```text
//! Snapshot (documents) → map → de-duplicate by id → sort → FeedView → watch channel
//! ```

pub mod order;
pub mod record;
pub mod synchronizer;
pub mod view;

pub use order::{sort_messages, PendingOrder};
pub use record::{MessageRecord, RecordError, ServerTimestamp};
pub use synchronizer::{FeedHealth, FeedState, FeedSynchronizer};
pub use view::FeedView;
