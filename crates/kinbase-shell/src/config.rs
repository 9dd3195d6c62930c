//! Shell configuration loaded from environment variables.
//!
//! | Variable                 | Default      | Description                                |
//! |--------------------------|--------------|--------------------------------------------|
//! | `KINBASE_DB_PATH`        | `kinbase.db` | SQLite database file (`:memory:` for RAM)   |
//! | `KINBASE_LOG_LEVEL`      | `info`       | tracing filter (trace/debug/info/warn/error) |
//! | `KINBASE_INSTALL_SCHEMA` | `true`       | create the built-in tables on start-up      |

/// Runtime configuration for the shell process.
#[derive(Debug)]
pub struct Config {
    /// SQLite database file, or `:memory:`.
    pub db_path: String,

    /// Tracing filter string, e.g. `"kinbase_local=debug,info"`.
    pub log_level: String,

    /// Create missing built-in tables before serving commands.
    pub install_schema: bool,
}

impl Config {
    /// Load configuration from environment variables, applying defaults where
    /// a variable is absent or unparseable.
    pub fn from_env() -> Self {
        Self {
            db_path:        env_str("KINBASE_DB_PATH", "kinbase.db"),
            log_level:      env_str("KINBASE_LOG_LEVEL", "info"),
            install_schema: env_bool("KINBASE_INSTALL_SCHEMA", true),
        }
    }

    pub fn in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
