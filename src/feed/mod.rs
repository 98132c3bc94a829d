//! Change feed for row-level updates from the backing store.
//!
//! One `ChangeFeed` stands for the process's realtime connection. Views open
//! logical channels on it instead of connections of their own:
//! - Channels filter by schema, table, change kind and a `column=eq.value`
//!   row filter
//! - A channel hears `Subscribed` once it has joined the live connection
//! - Bounded buffers with slow-channel dropping
//!
//! # Example
//!
//! ```ignore
//! let feed = ChangeFeed::default();
//! feed.connect();
//!
//! let config = ChannelConfig::table("public", "transactions")
//!     .with_filter(FilterExpr::parse("pool_id=eq.42")?);
//! let handle = feed.subscribe(config)?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Subscribed) => println!("live"),
//!         Ok(FeedEvent::Change { record }) => println!("{:?}", record.kind),
//!         Ok(FeedEvent::Closed { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{ChangeFeed, FeedConfig};
pub(crate) use types::column_text;
pub use types::{
    ChangeKind, ChangeRecord, ChannelConfig, ChannelHandle, ChannelId, CloseReason, EventFilter,
    FeedEvent, FilterExpr,
};
