//! kinbase shell: drives the offline backend over JSON lines.
//!
//! Reads configuration from environment variables (see [`config::Config`]),
//! opens the SQLite database, then answers one command per stdin line with one
//! response per stdout line. Logs go to stderr.
//!
//! ```bash
//! echo '{"query": {"table": "persons", "columns": "*", "filters": [{"type": "eq", "column": "id", "value": "p1"}], "single": true}}' \
//!   | KINBASE_DB_PATH=family.db cargo run --bin kinbase-shell
//!
//! echo '{"rpc": {"function": "is_person_in_subtree", "params": {"root_person_id": "p1", "target_person_id": "p4"}}}' \
//!   | KINBASE_LOG_LEVEL=debug cargo run --bin kinbase-shell
//! ```

use std::io::{self, BufRead, Write};

use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use kinbase_local::{codes, ApiError, LocalClient, QueryRequest, Response, RpcCall};

mod config;
use config::Config;

/// One line of input.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Command {
    Query(QueryRequest),
    Rpc(RpcCall),
}

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────────
    let config = Config::from_env();

    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .compact()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db_path = %config.db_path,
        "kinbase shell starting"
    );

    // ── Open database ─────────────────────────────────────────────────────────
    let client = if config.in_memory() {
        LocalClient::open_memory()
    } else {
        LocalClient::open(&config.db_path)
    }
    .map_err(|e| anyhow::anyhow!("failed to open database at {}: {e}", config.db_path))?;

    if config.install_schema {
        client.install_schema()?;
    }

    // ── Command loop ──────────────────────────────────────────────────────────
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut served = 0u64;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&client, &line);
        serde_json::to_writer(&mut stdout, &response)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
        served += 1;
    }

    info!(served, "stdin closed, shutting down");
    Ok(())
}

/// Parses and runs one command. Malformed input becomes an error response.
fn handle_line(client: &LocalClient, line: &str) -> Response {
    match serde_json::from_str::<Command>(line) {
        Ok(Command::Query(request)) => {
            debug!(table = %request.table, "query command");
            client.execute(&request)
        }
        Ok(Command::Rpc(call)) => {
            debug!(function = %call.function, "rpc command");
            client.rpc(&call.function, &call.params)
        }
        Err(e) => Response::err(ApiError::new(format!("invalid command: {e}"), Some(codes::INVALID_REQUEST))),
    }
}
