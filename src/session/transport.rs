//! Wire-level abstraction under the handle registry.
//!
//! The `Transport` trait lets the registry drive either a real PostgreSQL
//! session ([`super::PgTransport`]) or a scripted one for tests
//! ([`super::mock::MockTransport`]).

use std::fmt;
use std::sync::Arc;

use super::DbError;

/// A single column value, independent of the driver's type system.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row. Column names are shared by all rows of a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Looks up a value by column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Looks up a value by position.
    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A server session able to run statements into cursors.
///
/// Cursors are allocated first and executed into second, so a failed
/// execution leaves a cursor the caller still has to close.
pub trait Transport: Send {
    type Cursor: Send;

    /// Opens a transaction block.
    fn begin(&mut self) -> Result<(), DbError>;

    fn commit(&mut self) -> Result<(), DbError>;

    fn rollback(&mut self) -> Result<(), DbError>;

    /// Allocates an empty cursor.
    fn cursor(&mut self) -> Result<Self::Cursor, DbError>;

    /// Runs `sql` with positional `params` into `cursor`.
    fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        sql: &str,
        params: &[Value],
    ) -> Result<(), DbError>;

    /// Returns the next row of `cursor`, or `None` when exhausted.
    fn fetch(&mut self, cursor: &mut Self::Cursor) -> Result<Option<Row>, DbError>;

    fn close_cursor(&mut self, cursor: Self::Cursor) -> Result<(), DbError>;

    /// Closes the underlying session.
    fn close(&mut self) -> Result<(), DbError>;
}
