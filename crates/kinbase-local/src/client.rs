use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::LocalError;
use crate::executor;
use crate::request::{QueryRequest, Response};
use crate::rpc::{RpcParams, RpcRegistry};
use crate::schema::{self, SchemaCatalog};

/// Offline stand-in for the hosted backend client.
///
/// Owns one SQLite connection and routes queries to the executor and
/// procedure calls to the RPC registry. Both return the same
/// [`Response`] shape the hosted client does, so application code does not
/// care which one it talks to.
pub struct LocalClient {
    conn: Connection,
    catalog: &'static SchemaCatalog,
    rpc: RpcRegistry,
}

impl LocalClient {
    /// Opens (or creates) a SQLite database at the given file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LocalError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        debug!("Opened LocalClient");
        Self::from_connection(conn)
    }

    /// Opens an in-memory SQLite database (useful for testing).
    pub fn open_memory() -> Result<Self, LocalError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        debug!("Opened in-memory LocalClient");
        Self::from_connection(conn)
    }

    /// Wraps an already-open connection and prepares it for compiled queries
    /// (see [`schema::prepare_connection`]).
    pub fn from_connection(conn: Connection) -> Result<Self, LocalError> {
        schema::prepare_connection(&conn)?;
        Ok(Self {
            conn,
            catalog: SchemaCatalog::builtin(),
            rpc: RpcRegistry::with_builtins(),
        })
    }

    /// Creates the built-in tables if they are missing.
    pub fn install_schema(&self) -> Result<(), LocalError> {
        schema::install(&self.conn)
    }

    /// Runs a table query.
    pub fn execute(&self, request: &QueryRequest) -> Response {
        executor::execute(&self.conn, self.catalog, request)
    }

    /// Calls a remote procedure by name.
    pub fn rpc(&self, function: &str, params: &RpcParams) -> Response {
        self.rpc.invoke(&self.conn, function, params)
    }

    pub fn registry_mut(&mut self) -> &mut RpcRegistry {
        &mut self.rpc
    }

    pub fn catalog(&self) -> &'static SchemaCatalog {
        self.catalog
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
