//! Core types for pool-scoped collections.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Immutable identifier of a collection item (the row's primary key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parent grouping identifier (a pool).
///
/// Compared as text. Backends hand pool ids out as numbers or strings, so
/// both deserialize into the same scope.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeId(pub String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        ScopeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a scope out of a JSON column value.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(ScopeId(s.clone())),
            serde_json::Value::Number(n) => Some(ScopeId(n.to_string())),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ScopeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        ScopeId::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("scope id must be a string or a number"))
    }
}

impl From<&str> for ScopeId {
    fn from(s: &str) -> Self {
        ScopeId(s.to_string())
    }
}

impl From<i64> for ScopeId {
    fn from(n: i64) -> Self {
        ScopeId(n.to_string())
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Bearer credential applied to the change feed transport.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        AccessToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret itself.
        write!(f, "AccessToken(len={})", self.0.len())
    }
}

/// An item that can live in a reconciled collection.
pub trait LiveItem: Clone + Send + Sync + 'static {
    /// The item's immutable identifier.
    fn id(&self) -> ItemId;

    /// The scope the item belongs to.
    fn scope(&self) -> &ScopeId;
}

/// Kind of pool transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    AddOwner,
    RemoveOwner,
    SwapOwner,
    ChangeThreshold,
    UnlockToken,
    Purchase,
}

/// Lifecycle status of a pool transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    AwaitingConfirmations,
    AwaitingExecution,
    Completed,
    Failed,
    Rejected,
}

impl TransactionStatus {
    /// Whether the transaction can still change status.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Rejected
        )
    }
}

/// A pool transaction row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: ItemId,

    pub pool_id: ScopeId,

    #[serde(rename = "type")]
    pub kind: TransactionType,

    pub status: TransactionStatus,

    /// On-chain hash once submitted.
    #[serde(default)]
    pub hash: Option<String>,

    /// Multi-signature wallet nonce.
    #[serde(default)]
    pub safe_nonce: Option<u64>,

    /// Member who created the transaction.
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub memo: Option<String>,

    /// Amount in token units.
    #[serde(default)]
    pub amount: Option<f64>,

    /// Application-defined details (recipient, category, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,

    #[serde(default)]
    pub created_at: Timestamp,
}

impl Transaction {
    /// A fresh pending transaction.
    pub fn new(id: i64, pool_id: impl Into<ScopeId>, kind: TransactionType) -> Self {
        Self {
            id: ItemId(id),
            pool_id: pool_id.into(),
            kind,
            status: TransactionStatus::Pending,
            hash: None,
            safe_nonce: None,
            user_id: None,
            memo: None,
            amount: None,
            metadata: serde_json::Value::Null,
            created_at: Timestamp::now(),
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

impl LiveItem for Transaction {
    fn id(&self) -> ItemId {
        self.id
    }

    fn scope(&self) -> &ScopeId {
        &self.pool_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_from_number_or_string() {
        let numeric: ScopeId = serde_json::from_value(json!(42)).unwrap();
        let text: ScopeId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(numeric, text);
        assert!(serde_json::from_value::<ScopeId>(json!(null)).is_err());
    }

    #[test]
    fn test_transaction_columns() {
        let tx = Transaction::new(7, "pool-1", TransactionType::Withdrawal).with_amount(12.5);
        let row = serde_json::to_value(&tx).unwrap();

        assert_eq!(row["id"], 7);
        assert_eq!(row["pool_id"], "pool-1");
        assert_eq!(row["type"], "withdrawal");
        assert_eq!(row["status"], "pending");

        let back: Transaction = serde_json::from_value(row).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_transaction_from_sparse_row() {
        let tx: Transaction = serde_json::from_value(json!({
            "id": 3,
            "pool_id": 9,
            "type": "deposit",
            "status": "awaiting_execution"
        }))
        .unwrap();

        assert_eq!(tx.id(), ItemId(3));
        assert_eq!(tx.scope(), &ScopeId::from(9));
        assert!(tx.hash.is_none());
        assert!(!tx.status.is_final());
    }

    #[test]
    fn test_access_token_debug_hides_secret() {
        let token = AccessToken::new("super-secret");
        assert!(!format!("{:?}", token).contains("secret"));
    }
}
