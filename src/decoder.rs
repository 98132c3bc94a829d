//! Turns minimal change notifications into items the reconciler can merge.

use crate::error::{Result, SyncError};
use crate::feed::{ChangeKind, ChangeRecord};
use crate::reconciler::Action;
use crate::source::CollectionSource;
use crate::types::{ItemId, LiveItem, ScopeId};
use std::sync::Arc;

/// Identifier-level view of a change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: ItemId,
    /// Scope column of the row, when the message carries it.
    pub scope: Option<ScopeId>,
}

/// A hydrated change.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved<T> {
    Inserted(T),
    Updated(T),
    Removed(ItemId),
}

impl<T> From<Resolved<T>> for Action<T> {
    fn from(resolved: Resolved<T>) -> Self {
        match resolved {
            Resolved::Inserted(item) => Action::ItemInserted(item),
            Resolved::Updated(item) => Action::ItemUpdated(item),
            Resolved::Removed(id) => Action::ItemDeleted(id),
        }
    }
}

/// Decodes change records and re-fetches the rows they point at.
pub struct Decoder<T> {
    source: Arc<dyn CollectionSource<T>>,
    id_column: String,
    scope_column: String,
}

impl<T: LiveItem> Decoder<T> {
    pub fn new(
        source: Arc<dyn CollectionSource<T>>,
        id_column: impl Into<String>,
        scope_column: impl Into<String>,
    ) -> Self {
        Self {
            source,
            id_column: id_column.into(),
            scope_column: scope_column.into(),
        }
    }

    /// Read the identifier and scope out of a change record.
    pub fn decode(&self, record: &ChangeRecord) -> Result<ChangeEvent> {
        let raw = record.column(&self.id_column).ok_or_else(|| {
            SyncError::InvalidPayload(format!(
                "{:?} on {} has no {:?} column",
                record.kind, record.table,
                self.id_column
            ))
        })?;

        let id = raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
            .map(ItemId)
            .ok_or_else(|| {
                SyncError::InvalidPayload(format!("{:?} is not an item id", raw))
            })?;

        Ok(ChangeEvent {
            kind: record.kind,
            id,
            scope: record.column(&self.scope_column).and_then(ScopeId::from_json),
        })
    }

    /// Fetch the current row for an insert or update.
    ///
    /// Inserts and updates always re-read the row by id, even when the
    /// message carries it, so every path sees the store's latest version.
    /// Deletes need only the id.
    pub fn hydrate(&self, event: &ChangeEvent) -> Result<Resolved<T>> {
        match event.kind {
            ChangeKind::Insert => self.source.fetch_by_id(event.id).map(Resolved::Inserted),
            ChangeKind::Update => self.source.fetch_by_id(event.id).map(Resolved::Updated),
            ChangeKind::Delete => Ok(Resolved::Removed(event.id)),
        }
    }
}
