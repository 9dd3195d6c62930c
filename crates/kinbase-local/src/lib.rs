//! # kinbase-local
//!
//! Offline backend for the genealogy client, backed by SQLite.
//!
//! The application is written against a hosted relational backend and its
//! fluent query DSL. This crate answers the same requests locally: it compiles
//! each query into parameterized SQL, reconciles the backend's booleans and
//! JSON documents with SQLite's storage types, stamps generated columns, and
//! hosts the remote procedures the application calls. Every call returns the
//! hosted client's `{data, error}` shape.
//!
//! ## Quick start
//!
//! ```no_run
//! use kinbase_local::{LocalClient, QueryRequest};
//! use serde_json::json;
//!
//! let client = LocalClient::open_memory().unwrap();
//! client.install_schema().unwrap();
//!
//! let person = json!({"first_name": "Ada", "is_living": false});
//! let created = client.execute(
//!     &QueryRequest::table("persons")
//!         .insert(person.as_object().cloned().unwrap())
//!         .select("*")
//!         .single(),
//! );
//! assert_eq!(created.data["is_living"], json!(false));
//! ```

pub mod client;
pub mod coerce;
pub mod error;
pub mod error_map;
pub mod executor;
pub mod filter;
pub mod request;
pub mod rpc;
pub mod schema;
pub mod subtree;

// Re-exports for convenience.
pub use client::LocalClient;
pub use coerce::Row;
pub use error::{codes, ApiError, LocalError};
pub use executor::execute;
pub use filter::{CompareOp, Filter, NotOp, OrTerm, Predicate};
pub use request::{Body, Cardinality, Method, OrderBy, QueryRequest, Response};
pub use rpc::{RpcCall, RpcHandler, RpcParams, RpcRegistry};
pub use schema::{prepare_connection, SchemaCatalog, TableMeta};
pub use subtree::is_person_in_subtree;
