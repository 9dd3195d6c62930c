//! Request and response shapes, plus the fluent builder the application uses
//! in place of the hosted client's query DSL.
//!
//! ```
//! use kinbase_local::QueryRequest;
//!
//! let req = QueryRequest::table("persons")
//!     .select("id, first_name")
//!     .eq("tree_id", "t1")
//!     .order("last_name", true)
//!     .limit(20);
//! assert_eq!(req.filters.len(), 1);
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::Row;
use crate::error::{ApiError, LocalError};
use crate::filter::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for Method {
    type Err = LocalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(LocalError::UnknownMethod(other.to_string())),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = LocalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Method> for String {
    fn from(m: Method) -> Self {
        m.as_str().to_string()
    }
}

/// Insert/update payload: one record or an ordered batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Many(Vec<Row>),
    One(Row),
}

impl Body {
    pub fn into_records(self) -> Vec<Row> {
        match self {
            Self::Many(rows) => rows,
            Self::One(row) => vec![row],
        }
    }
}

impl From<Row> for Body {
    fn from(row: Row) -> Self {
        Self::One(row)
    }
}

impl From<Vec<Row>> for Body {
    fn from(rows: Vec<Row>) -> Self {
        Self::Many(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_true")]
    pub ascending: bool,
    /// `None` leaves null placement to the engine.
    #[serde(default)]
    pub nulls_first: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// How many rows the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Many,
    /// Exactly one row; anything else is an error on reads.
    Single,
    /// Zero or one row; zero yields null.
    MaybeSingle,
}

/// A full query against one table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryRequest {
    pub table: String,
    #[serde(default)]
    pub method: Method,
    /// Projection: `*` or a comma-separated column list. `None` on a write
    /// means "return nothing".
    #[serde(default)]
    pub columns: Option<String>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub single: bool,
    #[serde(default)]
    pub maybe_single: bool,
}

impl QueryRequest {
    /// Starts a select against `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Sets the projection. On writes this also asks for the written rows back.
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn insert(mut self, body: impl Into<Body>) -> Self {
        self.method = Method::Insert;
        self.body = Some(body.into());
        self
    }

    pub fn update(mut self, body: Row) -> Self {
        self.method = Method::Update;
        self.body = Some(Body::One(body));
        self
    }

    pub fn delete(mut self) -> Self {
        self.method = Method::Delete;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::neq(column, value))
    }

    pub fn in_<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::in_list(column, values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::is_null(column))
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(Filter::not_null(column))
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(Filter::ilike(column, pattern))
    }

    /// Adds an OR-group (`column.op.value,...`).
    pub fn or(self, conditions: &str) -> Result<Self, LocalError> {
        Ok(self.filter(Filter::or(conditions)?))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            ascending,
            nulls_first: None,
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Inclusive row range, zero-based: `range(0, 9)` is the first ten rows.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.offset = Some(from);
        self.limit = Some(to.saturating_sub(from).saturating_add(1));
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn maybe_single(mut self) -> Self {
        self.maybe_single = true;
        self
    }

    /// `single` takes precedence when a caller sets both flags.
    pub fn cardinality(&self) -> Cardinality {
        if self.single {
            Cardinality::Single
        } else if self.maybe_single {
            Cardinality::MaybeSingle
        } else {
            Cardinality::Many
        }
    }
}

/// Uniform result of every query and RPC call: data, or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub data: Value,
    pub error: Option<ApiError>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self { data, error: None }
    }

    pub fn err(error: ApiError) -> Self {
        Self { data: Value::Null, error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Value, ApiError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}
