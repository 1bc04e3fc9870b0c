//! Driver-boundary records: statements, values, rows and pages.
//!
//! Rows are a fixed record type (ordered, typed named fields) rather than an
//! open mapping. Typed getters validate shape at the point of use and report
//! `RowError` instead of panicking.

use crate::error::{RowError, TidemarkResult};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// VALUES
// ============================================================================

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Timestamp(Timestamp),
    Uuid(Uuid),
    Blob(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Name of the variant, used in type-mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Blob(_) => "blob",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// Column name the dry-run scan sentinel carries.
pub const DRY_RUN_SENTINEL_COLUMN: &str = "[dry_run]";

/// Column name carrying the outcome of a conditional (LWT) write.
pub const APPLIED_COLUMN: &str = "[applied]";

/// One result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a column, replacing an existing one of the same name in place.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The single placeholder row a dry-run scan yields instead of real data.
    pub fn dry_run_sentinel() -> Self {
        Row::new().with(DRY_RUN_SENTINEL_COLUMN, true)
    }

    pub fn is_dry_run_sentinel(&self) -> bool {
        matches!(self.get(DRY_RUN_SENTINEL_COLUMN), Some(Value::Bool(true)))
    }

    fn require(&self, name: &str) -> TidemarkResult<&Value> {
        self.get(name).ok_or_else(|| {
            RowError::MissingColumn {
                column: name.to_string(),
            }
            .into()
        })
    }

    fn mismatch<T>(name: &str, expected: &'static str, found: &Value) -> TidemarkResult<T> {
        Err(RowError::TypeMismatch {
            column: name.to_string(),
            expected,
            found: found.kind_name(),
        }
        .into())
    }

    pub fn text(&self, name: &str) -> TidemarkResult<&str> {
        match self.require(name)? {
            Value::Text(s) => Ok(s.as_str()),
            other => Self::mismatch(name, "text", other),
        }
    }

    /// Like [`Row::text`], but a missing column or `Null` yields `None`.
    pub fn opt_text(&self, name: &str) -> TidemarkResult<Option<&str>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.as_str())),
            Some(other) => Self::mismatch(name, "text", other),
        }
    }

    pub fn int(&self, name: &str) -> TidemarkResult<i32> {
        match self.require(name)? {
            Value::Int(v) => Ok(*v),
            other => Self::mismatch(name, "int", other),
        }
    }

    /// Accepts `int` cells as well, widening them.
    pub fn bigint(&self, name: &str) -> TidemarkResult<i64> {
        match self.require(name)? {
            Value::BigInt(v) => Ok(*v),
            Value::Int(v) => Ok(i64::from(*v)),
            other => Self::mismatch(name, "bigint", other),
        }
    }

    pub fn boolean(&self, name: &str) -> TidemarkResult<bool> {
        match self.require(name)? {
            Value::Bool(v) => Ok(*v),
            other => Self::mismatch(name, "boolean", other),
        }
    }

    pub fn timestamp(&self, name: &str) -> TidemarkResult<Timestamp> {
        match self.require(name)? {
            Value::Timestamp(v) => Ok(*v),
            other => Self::mismatch(name, "timestamp", other),
        }
    }

    pub fn opt_timestamp(&self, name: &str) -> TidemarkResult<Option<Timestamp>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Timestamp(v)) => Ok(Some(*v)),
            Some(other) => Self::mismatch(name, "timestamp", other),
        }
    }

    pub fn uuid(&self, name: &str) -> TidemarkResult<Uuid> {
        match self.require(name)? {
            Value::Uuid(v) => Ok(*v),
            other => Self::mismatch(name, "uuid", other),
        }
    }
}

// ============================================================================
// STATEMENTS & PAGES
// ============================================================================

/// A CQL statement with positional `?` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub cql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            params: Vec::new(),
        }
    }

    /// Append one positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn with_params(cql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            cql: cql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}

/// Opaque driver cursor for fetching the next page of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingState(pub Vec<u8>);

/// One page of results. `paging_state` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub paging_state: Option<PagingState>,
}

// ============================================================================
// TESTS
// ============================================================================
