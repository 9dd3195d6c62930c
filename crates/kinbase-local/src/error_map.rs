//! Translation of internal failures into the hosted backend's error shape.

use crate::error::{codes, ApiError, LocalError};

/// SQLite message fragments and the relational error codes they stand for.
///
/// Unique violations are classified by the executor before it gets here.
const SQLITE_MESSAGE_CODES: &[(&str, &str)] = &[
    ("FOREIGN KEY constraint failed", codes::FOREIGN_KEY_VIOLATION),
    ("NOT NULL constraint failed", codes::NOT_NULL_VIOLATION),
    ("no such table", codes::UNDEFINED_TABLE),
    ("no such column", codes::UNDEFINED_COLUMN),
    ("has no column named", codes::UNDEFINED_COLUMN),
];

/// Maps any [`LocalError`] to an [`ApiError`] with a stable code where one
/// exists. Engine failures without a known code keep their message and get no
/// code.
pub fn map_error(err: &LocalError) -> ApiError {
    match err {
        LocalError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => {
            ApiError::new(err.to_string(), Some(codes::NOT_FOUND)).with_details("The result contains 0 rows")
        }
        LocalError::Sqlite(inner) => {
            let message = inner.to_string();
            let code = SQLITE_MESSAGE_CODES
                .iter()
                .find(|(fragment, _)| message.contains(fragment))
                .map(|(_, code)| *code);
            ApiError::new(message, code)
        }
        LocalError::NoRows { .. } => {
            ApiError::new(err.to_string(), Some(codes::NOT_FOUND)).with_details("The result contains 0 rows")
        }
        LocalError::MultipleRows { count, .. } => ApiError::new(err.to_string(), Some(codes::NOT_FOUND))
            .with_details(format!("The result contains {count} rows")),
        LocalError::MissingParameter { .. } => ApiError::new(err.to_string(), Some(codes::INVALID_PARAMETER)),
        LocalError::UnknownFunction(_) => ApiError::new(err.to_string(), Some(codes::UNKNOWN_FUNCTION)),
        LocalError::UnknownMethod(_) | LocalError::InvalidRequest(_) | LocalError::InvalidFilter(_) => {
            ApiError::new(err.to_string(), Some(codes::INVALID_REQUEST))
        }
        LocalError::Json(_) => ApiError::new(err.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn sqlite_failure(sql: &str) -> LocalError {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             CREATE TABLE p (id TEXT PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE c (id TEXT PRIMARY KEY, p_id TEXT REFERENCES p(id));
             INSERT INTO p VALUES ('a', 'A');",
        )
        .unwrap();
        LocalError::from(conn.execute_batch(sql).unwrap_err())
    }

    #[test]
    fn constraint_failures_get_relational_codes() {
        let dup = map_error(&sqlite_failure("INSERT INTO p VALUES ('a', 'B')"));
        assert!(dup.code.is_none());
        assert!(dup.message.starts_with("UNIQUE constraint failed"));

        let fk = map_error(&sqlite_failure("INSERT INTO c VALUES ('x', 'missing')"));
        assert!(fk.has_code(codes::FOREIGN_KEY_VIOLATION));

        let nn = map_error(&sqlite_failure("INSERT INTO p (id) VALUES ('b')"));
        assert!(nn.has_code(codes::NOT_NULL_VIOLATION));
    }

    #[test]
    fn schema_failures_get_relational_codes() {
        assert!(map_error(&sqlite_failure("SELECT * FROM nope")).has_code(codes::UNDEFINED_TABLE));
        assert!(map_error(&sqlite_failure("SELECT nope FROM p")).has_code(codes::UNDEFINED_COLUMN));
    }

    #[test]
    fn no_rows_is_not_found() {
        let e = map_error(&LocalError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        assert!(e.has_code(codes::NOT_FOUND));
        let e = map_error(&LocalError::NoRows { table: "p".into() });
        assert!(e.has_code(codes::NOT_FOUND));
    }

    #[test]
    fn other_engine_failures_pass_the_message_through() {
        let e = map_error(&sqlite_failure("SELEC 1"));
        assert!(e.code.is_none());
        assert!(e.message.contains("syntax error"));
    }

    #[test]
    fn dispatcher_errors_have_codes() {
        let e = map_error(&LocalError::UnknownFunction("nope".into()));
        assert!(e.has_code(codes::UNKNOWN_FUNCTION));
        assert!(e.message.contains("nope"));

        let e = map_error(&LocalError::MissingParameter { function: "f", param: "x" });
        assert!(e.has_code(codes::INVALID_PARAMETER));

        let e = map_error(&LocalError::UnknownMethod("upsert".into()));
        assert!(e.has_code(codes::INVALID_REQUEST));
    }
}
