//! DuckDB-backed SQL execution

mod catalog;
mod convert;

pub use catalog::{ColumnInfo, DatabaseCatalog, TableCatalog};
pub use convert::to_json;

use async_trait::async_trait;
use duckdb::{AccessMode, Config, Connection};
use sqlsight_pipeline::{ExecutionError, ResultSet, SqlExecutor};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often a timed-out statement is interrupted again while its task is alive
const REINTERRUPT_INTERVAL: Duration = Duration::from_millis(50);

/// Executes statements on connections cloned from one shared database handle.
///
/// Each execution gets its own connection, runs on a blocking thread and is
/// interrupted when the timeout elapses.
pub struct DuckExecutor {
    db: Mutex<Connection>,
}

impl DuckExecutor {
    /// Opens a database file read-only with external file access disabled
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, ExecutionError> {
        let config = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .and_then(|config| config.with("enable_external_access", "false"))
            .map_err(connection_error)?;
        let conn = Connection::open_with_flags(path.as_ref(), config).map_err(connection_error)?;
        tracing::info!(path = %path.as_ref().display(), "Opened DuckDB database read-only");
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    fn checkout(&self) -> Result<Connection, ExecutionError> {
        let db = self
            .db
            .lock()
            .map_err(|_| ExecutionError::Connection("database handle poisoned".to_string()))?;
        db.try_clone().map_err(connection_error)
    }

    /// Introspects the schema on a fresh connection
    pub fn catalog(&self) -> Result<DatabaseCatalog, ExecutionError> {
        let conn = self.checkout()?;
        DatabaseCatalog::from_connection(&conn).map_err(database_error)
    }
}

#[async_trait]
impl SqlExecutor for DuckExecutor {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<ResultSet, ExecutionError> {
        let conn = self.checkout()?;
        let interrupt = conn.interrupt_handle();
        let cancelled = Arc::new(AtomicBool::new(false));
        let sql = sql.to_string();

        let flag = cancelled.clone();
        let mut task = tokio::task::spawn_blocking(move || run_query(&conn, &sql, &flag));

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ExecutionError::Database(format!("execution task failed: {}", e))),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                interrupt.interrupt();
                tracing::warn!(?timeout, "Statement timed out, interrupted");
                tokio::spawn(reap(task, move || interrupt.interrupt()));
                Err(ExecutionError::Timeout(timeout))
            }
        }
    }
}

/// Interrupts a timed-out statement until its blocking task exits.
///
/// DuckDB clears a pending interrupt when a statement starts, so a single
/// interrupt can be lost if the task had not reached the query yet.
async fn reap<F>(mut task: JoinHandle<Result<ResultSet, ExecutionError>>, interrupt: F)
where
    F: Fn() + Send + 'static,
{
    let mut ticks = tokio::time::interval(REINTERRUPT_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut task => break,
            _ = ticks.tick() => interrupt(),
        }
    }
    tracing::debug!("Timed-out statement released its connection");
}

fn run_query(conn: &Connection, sql: &str, cancelled: &AtomicBool) -> Result<ResultSet, ExecutionError> {
    if cancelled.load(Ordering::SeqCst) {
        return Err(cancelled_error());
    }
    let mut stmt = conn.prepare(sql).map_err(database_error)?;
    let mut rows = stmt.query([]).map_err(database_error)?;
    let columns: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

    let mut result_rows = Vec::new();
    while let Some(row) = rows.next().map_err(database_error)? {
        if cancelled.load(Ordering::SeqCst) {
            return Err(cancelled_error());
        }
        let values = (0..columns.len())
            .map(|idx| {
                row.get::<_, duckdb::types::Value>(idx)
                    .map(|v| convert::to_json(&v))
                    .map_err(database_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        result_rows.push(values);
    }

    Ok(ResultSet::new(columns, result_rows))
}

fn database_error(e: duckdb::Error) -> ExecutionError {
    ExecutionError::Database(e.to_string())
}

fn connection_error(e: duckdb::Error) -> ExecutionError {
    ExecutionError::Connection(e.to_string())
}

fn cancelled_error() -> ExecutionError {
    ExecutionError::Database("statement cancelled after timeout".to_string())
}
