//! Compiled-in table metadata and the DDL for the offline database.
//!
//! SQLite has no boolean or JSON column types. [`SchemaCatalog`] records,
//! per table, which INTEGER columns are logically booleans and which TEXT
//! columns hold JSON documents. The filter builder and the executor both read
//! the same catalog so they never disagree about a column's logical type.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::config::DbConfig;
use rusqlite::Connection;
use tracing::debug;

use crate::error::LocalError;

/// Logical-type overrides for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableMeta {
    /// Columns stored as INTEGER 0/1 but exposed as booleans.
    pub boolean_columns: &'static [&'static str],
    /// Columns stored as TEXT but exposed as JSON documents.
    pub document_columns: &'static [&'static str],
    /// Whether the table carries an `updated_at` column maintained on write.
    pub tracks_updated_at: bool,
}

/// Immutable table name → [`TableMeta`] mapping.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: HashMap<&'static str, TableMeta>,
}

impl SchemaCatalog {
    /// An empty catalog: every column of every table passes through untouched.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &'static str, meta: TableMeta) -> Self {
        self.tables.insert(name, meta);
        self
    }

    /// The process-wide catalog for the built-in tables.
    ///
    /// Built once on first access and never mutated afterwards.
    pub fn builtin() -> &'static SchemaCatalog {
        &BUILTIN
    }

    /// Metadata for `table`; unknown tables get the all-passthrough default.
    pub fn table(&self, table: &str) -> TableMeta {
        self.tables.get(table).copied().unwrap_or_default()
    }

    pub fn is_boolean(&self, table: &str, column: &str) -> bool {
        self.table(table).boolean_columns.contains(&column)
    }

    pub fn is_document(&self, table: &str, column: &str) -> bool {
        self.table(table).document_columns.contains(&column)
    }

    pub fn tracks_updated_at(&self, table: &str) -> bool {
        self.table(table).tracks_updated_at
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tables.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

static BUILTIN: Lazy<SchemaCatalog> = Lazy::new(|| {
    SchemaCatalog::new()
        .with_table(
            "trees",
            TableMeta {
                boolean_columns: &["is_public"],
                document_columns: &["settings"],
                tracks_updated_at: true,
            },
        )
        .with_table(
            "persons",
            TableMeta {
                boolean_columns: &["is_living", "is_private"],
                document_columns: &["custom_fields"],
                tracks_updated_at: true,
            },
        )
        .with_table(
            "families",
            TableMeta {
                boolean_columns: &[],
                document_columns: &[],
                tracks_updated_at: true,
            },
        )
        .with_table(
            "children",
            TableMeta {
                boolean_columns: &[],
                document_columns: &[],
                tracks_updated_at: false,
            },
        )
        .with_table(
            "events",
            TableMeta {
                boolean_columns: &["is_primary"],
                document_columns: &["metadata"],
                tracks_updated_at: true,
            },
        )
        .with_table(
            "settings",
            TableMeta {
                boolean_columns: &[],
                document_columns: &["value"],
                tracks_updated_at: true,
            },
        )
});

/// DDL for the built-in tables. Matches [`SchemaCatalog::builtin`].
pub const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS trees (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        is_public INTEGER NOT NULL DEFAULT 0,
        settings TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    );

    CREATE TABLE IF NOT EXISTS persons (
        id TEXT PRIMARY KEY,
        tree_id TEXT REFERENCES trees(id) ON DELETE CASCADE,
        first_name TEXT,
        last_name TEXT,
        gender TEXT,
        birth_date TEXT,
        death_date TEXT,
        is_living INTEGER NOT NULL DEFAULT 1,
        is_private INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        custom_fields TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    );

    CREATE TABLE IF NOT EXISTS families (
        id TEXT PRIMARY KEY,
        tree_id TEXT REFERENCES trees(id) ON DELETE CASCADE,
        father_id TEXT REFERENCES persons(id) ON DELETE SET NULL,
        mother_id TEXT REFERENCES persons(id) ON DELETE SET NULL,
        marriage_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    );

    CREATE TABLE IF NOT EXISTS children (
        id TEXT PRIMARY KEY,
        family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
        person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (family_id, person_id)
    );

    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL,
        event_date TEXT,
        place TEXT,
        is_primary INTEGER NOT NULL DEFAULT 0,
        metadata TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    );

    CREATE TABLE IF NOT EXISTS settings (
        id TEXT PRIMARY KEY,
        key TEXT NOT NULL UNIQUE,
        value TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_persons_tree ON persons(tree_id);
    CREATE INDEX IF NOT EXISTS idx_families_father ON families(father_id);
    CREATE INDEX IF NOT EXISTS idx_families_mother ON families(mother_id);
    CREATE INDEX IF NOT EXISTS idx_children_family ON children(family_id);
    CREATE INDEX IF NOT EXISTS idx_events_person ON events(person_id);
";

/// Creates the built-in tables if they do not exist yet.
pub fn install(conn: &Connection) -> Result<(), LocalError> {
    conn.execute_batch(SCHEMA_SQL)?;
    debug!("Installed built-in schema");
    Ok(())
}

/// Readies a connection for compiled queries. Safe to call more than once.
///
/// Turns off SQLite's fallback that reads an unknown `"identifier"` as a
/// string literal, so a misspelled column fails with "no such column" instead
/// of comparing against its own name, then registers the SQL functions.
pub fn prepare_connection(conn: &Connection) -> Result<(), LocalError> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DML, false)?;
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DDL, false)?;
    register_functions(conn)
}

/// Name of the Unicode-aware lowercase function used by `ilike` filters.
pub const UNICODE_LOWER: &str = "unicode_lower";

/// Registers the scalar SQL functions the compiled predicates rely on.
///
/// SQLite's own `lower()` and `LIKE` only fold ASCII, so pattern matching
/// lowercases both sides through [`UNICODE_LOWER`] instead.
pub fn register_functions(conn: &Connection) -> Result<(), LocalError> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lowered = match ctx.get_raw(0) {
                ValueRef::Null | ValueRef::Blob(_) => None,
                ValueRef::Integer(n) => Some(n.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_lowercase()),
            };
            Ok(lowered)
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_knows_logical_types() {
        let catalog = SchemaCatalog::builtin();
        assert!(catalog.is_boolean("persons", "is_living"));
        assert!(!catalog.is_boolean("persons", "first_name"));
        assert!(catalog.is_document("settings", "value"));
        assert!(catalog.tracks_updated_at("families"));
        assert!(!catalog.tracks_updated_at("children"));
    }

    #[test]
    fn unknown_table_passes_everything_through() {
        let catalog = SchemaCatalog::builtin();
        assert_eq!(catalog.table("nope"), TableMeta::default());
        assert!(!catalog.is_boolean("nope", "is_living"));
        assert!(!catalog.tracks_updated_at("nope"));
    }

    #[test]
    fn ddl_covers_every_catalog_table() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();
        for name in SchemaCatalog::builtin().table_names() {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [name],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {name}");
        }
    }

    #[test]
    fn prepared_connection_rejects_quoted_unknown_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT); INSERT INTO t VALUES ('a');").unwrap();

        prepare_connection(&conn).unwrap();
        prepare_connection(&conn).unwrap();
        let err = conn
            .query_row(r#"SELECT "missing" FROM t"#, [], |row| row.get::<_, String>(0))
            .unwrap_err();
        assert!(err.to_string().contains("no such column"));
        let lowered: String = conn.query_row("SELECT unicode_lower('Å')", [], |row| row.get(0)).unwrap();
        assert_eq!(lowered, "å");
    }

    #[test]
    fn unicode_lower_folds_non_ascii() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();
        let lowered: String = conn
            .query_row("SELECT unicode_lower('ÉMILE Øre')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lowered, "émile øre");
        let null: Option<String> = conn
            .query_row("SELECT unicode_lower(NULL)", [], |row| row.get(0))
            .unwrap();
        assert!(null.is_none());
    }
}
