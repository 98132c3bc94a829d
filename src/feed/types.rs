//! Change feed types: row-level change messages, channel configuration and
//! the events delivered to channels.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of row-level change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification as emitted by the backing store.
///
/// Mirrors the backend's JSON message: `eventType`, `schema`, `table`,
/// `commit_timestamp` and the `new`/`old` row snapshots. Rows that the
/// backend omits arrive as empty objects and are treated as absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,

    pub schema: String,

    pub table: String,

    #[serde(default)]
    pub commit_timestamp: Option<String>,

    #[serde(default)]
    pub new: Option<serde_json::Value>,

    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

impl ChangeRecord {
    pub fn insert(schema: &str, table: &str, new: serde_json::Value) -> Self {
        Self::build(ChangeKind::Insert, schema, table, Some(new), None)
    }

    pub fn update(
        schema: &str,
        table: &str,
        new: serde_json::Value,
        old: Option<serde_json::Value>,
    ) -> Self {
        Self::build(ChangeKind::Update, schema, table, Some(new), old)
    }

    pub fn delete(schema: &str, table: &str, old: serde_json::Value) -> Self {
        Self::build(ChangeKind::Delete, schema, table, None, Some(old))
    }

    fn build(
        kind: ChangeKind,
        schema: &str,
        table: &str,
        new: Option<serde_json::Value>,
        old: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            schema: schema.to_string(),
            table: table.to_string(),
            commit_timestamp: None,
            new,
            old,
        }
    }

    /// Parse a JSON change message.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidPayload(e.to_string()))
    }

    /// The `new` row, if present and non-empty.
    pub fn new_row(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        non_empty_row(self.new.as_ref())
    }

    /// The `old` row, if present and non-empty.
    pub fn old_row(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        non_empty_row(self.old.as_ref())
    }

    /// Look up a column, preferring the new row over the old one.
    pub fn column(&self, name: &str) -> Option<&serde_json::Value> {
        self.new_row()
            .and_then(|row| row.get(name))
            .or_else(|| self.old_row().and_then(|row| row.get(name)))
            .filter(|v| !v.is_null())
    }
}

fn non_empty_row(
    value: Option<&serde_json::Value>,
) -> Option<&serde_json::Map<String, serde_json::Value>> {
    value
        .and_then(|v| v.as_object())
        .filter(|row| !row.is_empty())
}

/// Render a scalar column value as filter text.
pub(crate) fn column_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Server-side row filter of the form `column=eq.value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterExpr {
    pub column: String,
    pub value: String,
}

impl FilterExpr {
    /// Equality filter on a column.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Parse `column=op.value`. Only the `eq` operator is supported.
    pub fn parse(expr: &str) -> Result<Self> {
        let (column, rest) = expr
            .split_once('=')
            .ok_or_else(|| SyncError::InvalidFilter(format!("missing '=' in {:?}", expr)))?;
        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| SyncError::InvalidFilter(format!("missing operator in {:?}", expr)))?;

        if column.is_empty() {
            return Err(SyncError::InvalidFilter(format!("empty column in {:?}", expr)));
        }
        if op != "eq" {
            return Err(SyncError::InvalidFilter(format!("unsupported operator {:?}", op)));
        }

        Ok(Self::eq(column, value))
    }

    /// Check a change against this filter.
    ///
    /// Delete messages often carry only the primary key, so a delete that
    /// lacks the filtered column is let through. Consumers re-check scope.
    pub fn matches(&self, record: &ChangeRecord) -> bool {
        match record.column(&self.column) {
            Some(value) => column_text(value).as_deref() == Some(self.value.as_str()),
            None => record.kind == ChangeKind::Delete,
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// Which change kinds a channel wants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventFilter {
    /// Every kind (`*`).
    #[default]
    All,
    Only(ChangeKind),
}

impl EventFilter {
    pub fn accepts(self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(k) => k == kind,
        }
    }
}

/// Configuration for a logical channel on the feed.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Database schema.
    /// Default: "public"
    pub schema: String,

    /// Table to watch.
    pub table: String,

    /// Change kinds to deliver.
    pub events: EventFilter,

    /// Row filter (None = every row of the table).
    pub filter: Option<FilterExpr>,

    /// Max buffered events before the channel is dropped.
    /// Default: 1024
    pub buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: String::new(),
            events: EventFilter::All,
            filter: None,
            buffer_size: 1024,
        }
    }
}

impl ChannelConfig {
    /// Watch every change of a table.
    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_events(mut self, events: EventFilter) -> Self {
        self.events = events;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Whether a change belongs on this channel.
    pub fn matches(&self, record: &ChangeRecord) -> bool {
        record.schema == self.schema
            && record.table == self.table
            && self.events.accepts(record.kind)
            && self.filter.as_ref().map_or(true, |f| f.matches(record))
    }
}

/// Events delivered to a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// The channel joined the live connection; changes follow.
    Subscribed,

    /// A matching row change.
    Change { record: ChangeRecord },

    /// The channel was closed and will receive nothing more.
    Closed { reason: CloseReason },
}

/// Why a channel was closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly removed.
    Unsubscribed,
    /// The feed was shut down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::BufferOverflow => f.write_str("buffer overflow"),
            CloseReason::Unsubscribed => f.write_str("unsubscribed"),
            CloseReason::Shutdown => f.write_str("feed shut down"),
        }
    }
}

/// Unique identifier for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Handle to a channel's event stream.
pub struct ChannelHandle {
    pub id: ChannelId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
}

impl ChannelHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
