//! Query executor: compiles a [`QueryRequest`] into SQL and runs it.
//!
//! Every path coerces row data through [`crate::coerce`] in both directions
//! and ends in the uniform [`Response`]. Nothing escapes as an `Err`.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::coerce::{self, Row};
use crate::error::{codes, ApiError, LocalError};
use crate::error_map;
use crate::filter::{self, quote_ident, Predicate};
use crate::request::{Body, Cardinality, Method, OrderBy, QueryRequest, Response};
use crate::schema::{self, SchemaCatalog};

/// Fragment of SQLite's message for a violated UNIQUE or PRIMARY KEY constraint.
const UNIQUE_VIOLATION_MARKER: &str = "UNIQUE constraint failed";

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

// ─────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────

/// Runs `request` against `conn` and returns data or a structured error.
///
/// `conn` may be any open connection; it is prepared with
/// [`schema::prepare_connection`] before the query runs.
#[instrument(skip_all, fields(table = %request.table, method = request.method.as_str()))]
pub fn execute(conn: &Connection, catalog: &SchemaCatalog, request: &QueryRequest) -> Response {
    if let Err(err) = schema::prepare_connection(conn) {
        return Response::err(report_failure(&err));
    }

    let outcome = match request.method {
        Method::Select => run_select(conn, catalog, request),
        Method::Insert => run_insert(conn, catalog, request),
        Method::Update => run_update(conn, catalog, request),
        Method::Delete => run_delete(conn, catalog, request),
    };

    match outcome {
        Ok(data) => Response::ok(data),
        Err(err) => Response::err(report_failure(&err)),
    }
}

/// Unique violations get their dedicated code here; everything else goes
/// through the generic mapper. Both carry the engine's own message.
fn report_failure(err: &LocalError) -> ApiError {
    if let LocalError::Sqlite(inner) = err {
        let message = inner.to_string();
        if message.contains(UNIQUE_VIOLATION_MARKER) {
            warn!(error = %message, "unique constraint violated");
            return ApiError::new(message, Some(codes::UNIQUE_VIOLATION));
        }
    }
    let mapped = error_map::map_error(err);
    warn!(error = %mapped, "query failed");
    mapped
}

// ─────────────────────────────────────────────
// Methods
// ─────────────────────────────────────────────

fn run_select(conn: &Connection, catalog: &SchemaCatalog, request: &QueryRequest) -> Result<Value, LocalError> {
    let predicate = filter::build(&request.filters, &request.table, catalog);
    let projection = projection(request.columns.as_deref().unwrap_or("*"))?;

    let mut sql = format!("SELECT {} FROM {}{}", projection, quote_ident(&request.table), predicate.clause);
    sql.push_str(&order_clause(&request.order));
    sql.push_str(&limit_clause(request.limit, request.offset));

    let rows = read_logical(conn, catalog, &request.table, &sql, &predicate.params)?;
    shape_read(rows, request.cardinality(), &request.table)
}

fn run_insert(conn: &Connection, catalog: &SchemaCatalog, request: &QueryRequest) -> Result<Value, LocalError> {
    let records = request
        .body
        .clone()
        .ok_or_else(|| LocalError::InvalidRequest("insert requires a body".into()))?
        .into_records();
    let table = request.table.as_str();
    let projection = request.columns.as_deref().map(projection).transpose()?;
    let tracks_updated_at = catalog.tracks_updated_at(table);

    let mut returned = Vec::new();
    for record in records {
        let mut stored = coerce::to_storage(catalog, table, record);
        let now = coerce::now_timestamp();
        if is_absent(&stored, ID_COLUMN) {
            stored.insert(ID_COLUMN.into(), Value::String(coerce::new_id()));
        }
        if is_absent(&stored, CREATED_AT_COLUMN) {
            stored.insert(CREATED_AT_COLUMN.into(), Value::String(now.clone()));
        }
        if tracks_updated_at && is_absent(&stored, UPDATED_AT_COLUMN) {
            stored.insert(UPDATED_AT_COLUMN.into(), Value::String(now));
        }

        let columns: Vec<String> = stored.keys().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders
        );
        let params: Vec<SqlValue> = stored.values().map(coerce::to_sql).collect();
        debug!(sql = %sql, "insert");
        conn.execute(&sql, params_from_iter(params.iter()))?;

        if let Some(projection) = &projection {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?",
                projection,
                quote_ident(table),
                quote_ident(ID_COLUMN)
            );
            let id = coerce::to_sql(&stored[ID_COLUMN]);
            returned.extend(read_logical(conn, catalog, table, &sql, &[id])?);
        }
    }

    if projection.is_none() {
        return Ok(Value::Null);
    }
    Ok(shape_written(returned, request.cardinality()))
}

fn run_update(conn: &Connection, catalog: &SchemaCatalog, request: &QueryRequest) -> Result<Value, LocalError> {
    let body = match request.body.clone() {
        Some(Body::One(row)) => row,
        Some(Body::Many(_)) => {
            return Err(LocalError::InvalidRequest("update takes a single record".into()))
        }
        None => return Err(LocalError::InvalidRequest("update requires a body".into())),
    };
    let table = request.table.as_str();
    let projection = request.columns.as_deref().map(projection).transpose()?;

    let mut stored = coerce::to_storage(catalog, table, body);
    if catalog.tracks_updated_at(table) {
        // last write wins, even over a caller-supplied value
        stored.insert(UPDATED_AT_COLUMN.into(), Value::String(coerce::now_timestamp()));
    }
    if stored.is_empty() {
        return Err(LocalError::InvalidRequest("update body is empty".into()));
    }

    let predicate = filter::build(&request.filters, table, catalog);
    let assignments: Vec<String> = stored.keys().map(|c| format!("{} = ?", quote_ident(c))).collect();
    let sql = format!("UPDATE {} SET {}{}", quote_ident(table), assignments.join(", "), predicate.clause);

    let mut params: Vec<SqlValue> = stored.values().map(coerce::to_sql).collect();
    params.extend(predicate.params.iter().cloned());
    let changed = conn.execute(&sql, params_from_iter(params.iter()))?;
    debug!(sql = %sql, changed, "update");

    match projection {
        Some(projection) => {
            let rows = reselect(conn, catalog, table, &projection, &predicate)?;
            Ok(shape_written(rows, request.cardinality()))
        }
        None => Ok(Value::Null),
    }
}

fn run_delete(conn: &Connection, catalog: &SchemaCatalog, request: &QueryRequest) -> Result<Value, LocalError> {
    let predicate = filter::build(&request.filters, &request.table, catalog);
    let sql = format!("DELETE FROM {}{}", quote_ident(&request.table), predicate.clause);
    let deleted = conn.execute(&sql, params_from_iter(predicate.params.iter()))?;
    debug!(sql = %sql, deleted, "delete");
    Ok(Value::Null)
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

fn is_absent(row: &Row, column: &str) -> bool {
    row.get(column).map_or(true, Value::is_null)
}

/// Compiles a projection: `*`, or a comma-separated list of column names.
fn projection(columns: &str) -> Result<String, LocalError> {
    let columns = columns.trim();
    if columns.is_empty() || columns == "*" {
        return Ok("*".to_string());
    }
    let quoted = columns
        .split(',')
        .map(str::trim)
        .map(|c| {
            if c.is_empty() {
                Err(LocalError::InvalidRequest(format!("empty column in projection '{columns}'")))
            } else if c == "*" {
                Ok("*".to_string())
            } else {
                Ok(quote_ident(c))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(", "))
}

fn order_clause(order: &[OrderBy]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let terms: Vec<String> = order
        .iter()
        .map(|o| {
            let mut term = format!("{} {}", quote_ident(&o.column), if o.ascending { "ASC" } else { "DESC" });
            match o.nulls_first {
                Some(true) => term.push_str(" NULLS FIRST"),
                Some(false) => term.push_str(" NULLS LAST"),
                None => {}
            }
            term
        })
        .collect();
    format!(" ORDER BY {}", terms.join(", "))
}

fn limit_clause(limit: Option<u64>, offset: Option<u64>) -> String {
    // SQLite takes signed 64-bit bounds; a limit past that is unbounded.
    let limit = limit.map(|n| i64::try_from(n).unwrap_or(-1));
    let offset = offset.map(|m| i64::try_from(m).unwrap_or(i64::MAX));
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(n), None) => format!(" LIMIT {n}"),
        (Some(n), Some(m)) => format!(" LIMIT {n} OFFSET {m}"),
        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        (None, Some(m)) => format!(" LIMIT -1 OFFSET {m}"),
    }
}

fn reselect(
    conn: &Connection,
    catalog: &SchemaCatalog,
    table: &str,
    projection: &str,
    predicate: &Predicate,
) -> Result<Vec<Row>, LocalError> {
    let sql = format!("SELECT {} FROM {}{}", projection, quote_ident(table), predicate.clause);
    read_logical(conn, catalog, table, &sql, &predicate.params)
}

/// Runs a SELECT and returns its rows in logical form.
fn read_logical(
    conn: &Connection,
    catalog: &SchemaCatalog,
    table: &str,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<Row>, LocalError> {
    let rows = query_rows(conn, sql, params)?;
    debug!(sql = %sql, rows = rows.len(), "select");
    Ok(rows.into_iter().map(|row| coerce::to_logical(catalog, table, row)).collect())
}

/// Runs a SELECT and returns raw rows keyed by column name.
pub(crate) fn query_rows(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, LocalError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mapped = stmt.query_map(params_from_iter(params.iter()), |row| {
        let mut out = Row::new();
        for (i, name) in columns.iter().enumerate() {
            out.insert(name.clone(), coerce::from_sql(row.get_ref(i)?));
        }
        Ok(out)
    })?;

    let mut rows = Vec::new();
    for row in mapped {
        rows.push(row?);
    }
    Ok(rows)
}

/// Read-path cardinality: `single` insists on exactly one row.
fn shape_read(mut rows: Vec<Row>, cardinality: Cardinality, table: &str) -> Result<Value, LocalError> {
    match cardinality {
        Cardinality::Many => Ok(Value::Array(rows.into_iter().map(Value::Object).collect())),
        Cardinality::MaybeSingle => Ok(first_or_null(rows)),
        Cardinality::Single => match rows.len() {
            0 => Err(LocalError::NoRows { table: table.to_string() }),
            1 => Ok(Value::Object(rows.remove(0))),
            count => Err(LocalError::MultipleRows { table: table.to_string(), count }),
        },
    }
}

/// Write-path cardinality: either modifier returns the first row, if any.
fn shape_written(rows: Vec<Row>, cardinality: Cardinality) -> Value {
    match cardinality {
        Cardinality::Many => Value::Array(rows.into_iter().map(Value::Object).collect()),
        Cardinality::Single | Cardinality::MaybeSingle => first_or_null(rows),
    }
}

fn first_or_null(rows: Vec<Row>) -> Value {
    rows.into_iter().next().map_or(Value::Null, Value::Object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_quotes_each_column() {
        assert_eq!(projection("*").unwrap(), "*");
        assert_eq!(projection("").unwrap(), "*");
        assert_eq!(projection("id, first_name").unwrap(), r#""id", "first_name""#);
        assert!(projection("id,,name").is_err());
    }

    #[test]
    fn order_and_limit_clauses() {
        let order = vec![
            OrderBy { column: "last_name".into(), ascending: true, nulls_first: None },
            OrderBy { column: "birth_date".into(), ascending: false, nulls_first: Some(false) },
        ];
        assert_eq!(
            order_clause(&order),
            r#" ORDER BY "last_name" ASC, "birth_date" DESC NULLS LAST"#
        );
        assert_eq!(order_clause(&[]), "");
        assert_eq!(limit_clause(Some(5), None), " LIMIT 5");
        assert_eq!(limit_clause(Some(5), Some(10)), " LIMIT 5 OFFSET 10");
        assert_eq!(limit_clause(None, Some(3)), " LIMIT -1 OFFSET 3");
        assert_eq!(limit_clause(Some(u64::MAX), Some(0)), " LIMIT -1 OFFSET 0");
    }

    #[test]
    fn read_cardinality() {
        let row = |id: &str| {
            let mut r = Row::new();
            r.insert("id".into(), Value::String(id.into()));
            r
        };
        assert!(matches!(
            shape_read(vec![], Cardinality::Single, "t"),
            Err(LocalError::NoRows { .. })
        ));
        assert!(matches!(
            shape_read(vec![row("a"), row("b")], Cardinality::Single, "t"),
            Err(LocalError::MultipleRows { count: 2, .. })
        ));
        assert_eq!(shape_read(vec![row("a")], Cardinality::Single, "t").unwrap()["id"], "a");
        assert_eq!(shape_read(vec![], Cardinality::MaybeSingle, "t").unwrap(), Value::Null);
        assert_eq!(
            shape_read(vec![row("a"), row("b")], Cardinality::MaybeSingle, "t").unwrap()["id"],
            "a"
        );
        assert_eq!(shape_read(vec![], Cardinality::Many, "t").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn unique_failures_are_reported_with_their_code() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = LocalError::from(conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err());
        let reported = report_failure(&err);
        assert!(reported.has_code(codes::UNIQUE_VIOLATION));
        assert!(reported.message.starts_with("UNIQUE constraint failed"), "{}", reported.message);
        // the generic mapper has no unique entry, so the code above came from here
        assert!(error_map::map_error(&err).code.is_none());

        let err = LocalError::InvalidRequest("x".into());
        assert!(report_failure(&err).has_code(codes::INVALID_REQUEST));
    }
}
