//! Sources that load collections and single items from the backing store.

mod filter;
mod memory;

pub use filter::{Condition, ItemFilter};
pub use memory::MemoryTable;

use crate::error::Result;
use crate::types::{ItemId, ScopeId};

/// Read access to a scoped collection.
///
/// Both calls are plain reads: callers may retry them freely.
pub trait CollectionSource<T>: Send + Sync {
    /// Load every item of a scope that passes the filter, newest first.
    fn fetch_all(&self, scope: &ScopeId, filter: Option<&ItemFilter>) -> Result<Vec<T>>;

    /// Load the current version of one item.
    ///
    /// Fails with `SyncError::NotFound` once the item is gone.
    fn fetch_by_id(&self, id: ItemId) -> Result<T>;
}
