use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while compiling or running a request.
///
/// These never cross the public entry points directly: the executor and the
/// RPC dispatcher convert them into an [`ApiError`] inside a [`crate::Response`].
#[derive(Debug, Error)]
pub enum LocalError {
    /// An error originating from the underlying SQLite database.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A filter descriptor could not be turned into a [`crate::Filter`].
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// The request is structurally unusable (bad projection, empty body, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request named a method other than select/insert/update/delete.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// `single()` was requested and the read matched no row.
    #[error("JSON object requested, multiple (or no) rows returned")]
    NoRows { table: String },

    /// `single()` was requested and the read matched more than one row.
    #[error("JSON object requested, multiple (or no) rows returned")]
    MultipleRows { table: String, count: usize },

    /// The RPC registry has no handler with that name.
    #[error("Could not find the function {0}")]
    UnknownFunction(String),

    /// A required RPC parameter was absent or null.
    #[error("Missing required parameter '{param}' for function {function}")]
    MissingParameter {
        function: &'static str,
        param: &'static str,
    },
}

/// Error payload returned to callers, shaped like the hosted backend's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            message: message.into(),
            code: code.map(str::to_string),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns true when the error carries the given stable code.
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Stable error codes, matching what callers of the hosted backend branch on.
pub mod codes {
    /// No row (or more than one) where exactly one was required.
    pub const NOT_FOUND: &str = "PGRST116";
    /// Uniqueness constraint violated.
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const UNDEFINED_COLUMN: &str = "42703";
    /// Missing or malformed RPC parameter.
    pub const INVALID_PARAMETER: &str = "22023";
    pub const UNKNOWN_FUNCTION: &str = "PGRST202";
    /// Unknown method or a request that could not be parsed.
    pub const INVALID_REQUEST: &str = "PGRST100";
}
