//! Column filters applied by collection sources.

use crate::feed::column_text;
use serde::Serialize;
use serde_json::{Map, Value};

/// A single column condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq { column: String, value: Value },
    Neq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    NotIn { column: String, values: Vec<Value> },
}

impl Condition {
    fn column(&self) -> &str {
        match self {
            Condition::Eq { column, .. }
            | Condition::Neq { column, .. }
            | Condition::In { column, .. }
            | Condition::NotIn { column, .. } => column,
        }
    }

    /// A missing or null column never matches, as in SQL.
    fn matches(&self, row: &Map<String, Value>) -> bool {
        let Some(actual) = row.get(self.column()).filter(|v| !v.is_null()) else {
            return false;
        };

        match self {
            Condition::Eq { value, .. } => same(actual, value),
            Condition::Neq { value, .. } => !same(actual, value),
            Condition::In { values, .. } => values.iter().any(|v| same(actual, v)),
            Condition::NotIn { values, .. } => !values.iter().any(|v| same(actual, v)),
        }
    }
}

/// Scalars compare by their text form so `42` and `"42"` agree.
fn same(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (column_text(a), column_text(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Conjunction of column conditions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemFilter {
    conditions: Vec<Condition>,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Neq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn one_of<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn not_in<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::NotIn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Hide transactions whose status is `failed`.
    pub fn exclude_failed() -> Self {
        Self::new().not_in("status", ["failed"])
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a row.
    pub fn matches_row(&self, row: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Evaluate against an item's serialized columns. Items that do not
    /// serialize to an object never match a non-empty filter.
    pub fn matches<T: Serialize>(&self, item: &T) -> bool {
        if self.is_empty() {
            return true;
        }
        match serde_json::to_value(item) {
            Ok(Value::Object(row)) => self.matches_row(&row),
            _ => false,
        }
    }
}
