//! In-process table that serves as a collection source and emits changes.

use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeed, ChangeRecord};
use crate::types::{ItemId, LiveItem, ScopeId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CollectionSource, ItemFilter};

#[derive(Default)]
struct Faults {
    /// Fetches left to fail, and the message to fail them with.
    failing: Option<(usize, String)>,
    delay: Option<Duration>,
}

/// A table of rows held in memory.
///
/// Writes are published to the attached feed the way the backing store's
/// replication stream would: inserts and updates carry the full row, deletes
/// carry only the primary key.
pub struct MemoryTable<T> {
    schema: String,
    table: String,
    /// Rows in insertion order.
    rows: RwLock<Vec<T>>,
    feed: Option<Arc<ChangeFeed>>,
    faults: Mutex<Faults>,
    fetches: AtomicU64,
}

impl<T> MemoryTable<T>
where
    T: LiveItem + Serialize,
{
    /// Create an empty table with no feed attached.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            rows: RwLock::new(Vec::new()),
            feed: None,
            faults: Mutex::new(Faults::default()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Publish every write to this feed.
    pub fn with_feed(mut self, feed: Arc<ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    // --- Writes ---

    /// Insert a new row.
    pub fn insert(&self, item: T) -> Result<()> {
        let row = serde_json::to_value(&item)?;
        {
            let mut rows = self.rows.write();
            if rows.iter().any(|r| r.id() == item.id()) {
                return Err(SyncError::Fetch(format!(
                    "duplicate key {} in {}",
                    item.id(),
                    self.table
                )));
            }
            rows.push(item);
        }
        self.emit(ChangeRecord::insert(&self.schema, &self.table, row));
        Ok(())
    }

    /// Replace an existing row.
    pub fn update(&self, item: T) -> Result<()> {
        let row = serde_json::to_value(&item)?;
        let id = item.id();
        {
            let mut rows = self.rows.write();
            let slot = rows
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or(SyncError::NotFound(id))?;
            *slot = item;
        }
        self.emit(ChangeRecord::update(
            &self.schema,
            &self.table,
            row,
            Some(json!({ "id": id })),
        ));
        Ok(())
    }

    /// Delete a row, returning it.
    pub fn delete(&self, id: ItemId) -> Result<T> {
        let removed = {
            let mut rows = self.rows.write();
            let pos = rows
                .iter()
                .position(|r| r.id() == id)
                .ok_or(SyncError::NotFound(id))?;
            rows.remove(pos)
        };
        self.emit(ChangeRecord::delete(
            &self.schema,
            &self.table,
            json!({ "id": id }),
        ));
        Ok(removed)
    }

    fn emit(&self, record: ChangeRecord) {
        if let Some(feed) = &self.feed {
            feed.publish(&record);
        }
    }

    // --- Fault injection ---

    /// Fail the next `count` fetches with a `SyncError::Fetch`.
    pub fn fail_next_fetches(&self, count: usize, message: impl Into<String>) {
        self.faults.lock().failing = Some((count, message.into()));
    }

    /// Sleep before answering every fetch.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.faults.lock().delay = delay;
    }

    fn before_fetch(&self) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = {
            let mut faults = self.faults.lock();
            if let Some((remaining, message)) = faults.failing.take() {
                if remaining > 1 {
                    faults.failing = Some((remaining - 1, message.clone()));
                }
                if remaining > 0 {
                    return Err(SyncError::Fetch(message));
                }
            }
            faults.delay
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    // --- Stats ---

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of fetches served (or failed) so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<T> CollectionSource<T> for MemoryTable<T>
where
    T: LiveItem + Serialize,
{
    fn fetch_all(&self, scope: &ScopeId, filter: Option<&ItemFilter>) -> Result<Vec<T>> {
        self.before_fetch()?;
        let rows = self.rows.read();
        Ok(rows
            .iter()
            .rev()
            .filter(|r| r.scope() == scope)
            .filter(|r| filter.map_or(true, |f| f.matches(*r)))
            .cloned()
            .collect())
    }

    fn fetch_by_id(&self, id: ItemId) -> Result<T> {
        self.before_fetch()?;
        self.rows
            .read()
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or(SyncError::NotFound(id))
    }
}
