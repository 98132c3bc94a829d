//! Reconciler state and the snapshots handed to consumers.

use crate::error::SyncError;
use crate::types::{ItemId, LiveItem};

/// Coarse phase of a reconciled collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Initial load has not finished; no items visible.
    Loading,
    /// Items visible, no error recorded.
    Ready,
    /// Items visible, last error recorded. Later events still apply.
    ReadyWithError,
}

/// In-memory collection merged from the initial load and change events.
///
/// Holds at most one entry per item id. Newest insertions come first.
#[derive(Clone, Debug)]
pub struct ReconcilerState<T> {
    pub(crate) items: Vec<T>,
    pub(crate) loading: bool,
    pub(crate) error: Option<SyncError>,
    /// Bumped on every change.
    pub(crate) revision: u64,
}

impl<T: LiveItem> ReconcilerState<T> {
    /// Empty state, still loading.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            error: None,
            revision: 0,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.error.is_some() {
            Phase::ReadyWithError
        } else {
            Phase::Ready
        }
    }

    pub(crate) fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.position(id).map(|pos| &self.items[pos])
    }

    /// Copy the state out for a consumer.
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            items: self.items.clone(),
            loading: self.loading,
            error: self.error.clone(),
            revision: self.revision,
        }
    }
}

impl<T: LiveItem> Default for ReconcilerState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a live collection.
#[derive(Clone, Debug)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<SyncError>,
    pub revision: u64,
}

impl<T: LiveItem> Snapshot<T> {
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(LiveItem::id).collect()
    }

    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }
}
