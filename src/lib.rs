//! # Pool Sync
//!
//! Live, reconciled views of pool-scoped collections (a pool's transactions)
//! kept current by a realtime change feed.
//!
//! ## Core Concepts
//!
//! - **Sources**: load a scope's collection and re-fetch single rows
//! - **Change feed**: one process-wide connection multiplexing filtered channels
//! - **Decoder**: turns minimal change messages into full rows
//! - **Reconciler**: merges the initial load and changes into one ordered,
//!   deduplicated list
//! - **Live collections**: own the channel lifecycle and the single writer
//!   that applies changes in arrival order
//!
//! ## Example
//!
//! ```ignore
//! use poolsync::{ChangeFeed, LiveCollection, LiveCollectionConfig, MemoryTable, SessionCredentials};
//!
//! let feed = Arc::new(ChangeFeed::default());
//! feed.connect();
//!
//! let table = Arc::new(MemoryTable::new("public", "transactions").with_feed(Arc::clone(&feed)));
//! let session = Arc::new(SessionCredentials::new());
//! session.rotate(access_token);
//!
//! let live = LiveCollection::<Transaction>::open(
//!     LiveCollectionConfig::new("42").with_filter(ItemFilter::exclude_failed()),
//!     table,
//!     feed,
//!     session,
//! )?;
//!
//! let snapshot = live.snapshot();
//! println!("{} transactions, loading={}", snapshot.items.len(), snapshot.loading);
//! ```

pub mod credentials;
pub mod decoder;
pub mod error;
pub mod feed;
pub mod live;
pub mod reconciler;
pub mod source;
pub mod types;

// Re-exports
pub use credentials::{CredentialProvider, SessionCredentials, StaticCredentials};
pub use decoder::{ChangeEvent, Decoder, Resolved};
pub use error::{Result, SyncError};
pub use feed::{
    ChangeFeed, ChangeKind, ChangeRecord, ChannelConfig, ChannelHandle, ChannelId, CloseReason,
    EventFilter, FeedConfig, FeedEvent, FilterExpr,
};
pub use live::{LiveCollection, LiveCollectionConfig};
pub use reconciler::{Action, Phase, ReconcilerState, Snapshot};
pub use source::{CollectionSource, Condition, ItemFilter, MemoryTable};
pub use types::*;
