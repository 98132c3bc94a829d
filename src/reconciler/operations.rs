//! Transitions of the reconciler state machine.

use crate::error::SyncError;
use crate::types::{ItemId, LiveItem};
use std::collections::HashSet;

use super::state::ReconcilerState;

/// An input to the reconciler.
#[derive(Clone, Debug)]
pub enum Action<T> {
    /// The initial load (or a refresh) returned these items.
    LoadSucceeded(Vec<T>),

    /// The initial load (or a refresh) failed.
    LoadFailed(SyncError),

    /// A hydrated insert event.
    ItemInserted(T),

    /// A hydrated update event.
    ItemUpdated(T),

    /// A delete event.
    ItemDeleted(ItemId),

    /// A change event could not be hydrated.
    EventFetchFailed(SyncError),

    /// The change channel was closed underneath the collection.
    StreamFailed(SyncError),
}

impl<T> Action<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Action::LoadSucceeded(_) => "load_succeeded",
            Action::LoadFailed(_) => "load_failed",
            Action::ItemInserted(_) => "item_inserted",
            Action::ItemUpdated(_) => "item_updated",
            Action::ItemDeleted(_) => "item_deleted",
            Action::EventFetchFailed(_) => "event_fetch_failed",
            Action::StreamFailed(_) => "stream_failed",
        }
    }
}

impl<T: LiveItem> ReconcilerState<T> {
    /// Apply an action. Returns whether the state changed.
    ///
    /// No transition is terminal: errors are recorded next to the items and
    /// later actions keep applying.
    pub fn apply(&mut self, action: Action<T>) -> bool {
        let changed = match action {
            Action::LoadSucceeded(items) => {
                self.items = dedup_by_id(items);
                self.loading = false;
                self.error = None;
                true
            }

            Action::LoadFailed(error)
            | Action::EventFetchFailed(error)
            | Action::StreamFailed(error) => {
                self.loading = false;
                self.error = Some(error);
                true
            }

            Action::ItemInserted(item) => {
                match self.position(item.id()) {
                    // Replay of a row we already hold
                    Some(pos) => self.items[pos] = item,
                    None => self.items.insert(0, item),
                }
                true
            }

            Action::ItemUpdated(item) => match self.position(item.id()) {
                Some(pos) => {
                    self.items[pos] = item;
                    true
                }
                None => false,
            },

            Action::ItemDeleted(id) => match self.position(id) {
                Some(pos) => {
                    self.items.remove(pos);
                    true
                }
                None => false,
            },
        };

        if changed {
            self.revision += 1;
        }
        changed
    }
}

/// Keep the first entry for every id, preserving order.
fn dedup_by_id<T: LiveItem>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.id())).collect()
}
