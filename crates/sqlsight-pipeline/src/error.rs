//! Error types for capabilities and pipeline stages

use sqlsight_safety::Violation;
use std::time::Duration;
use thiserror::Error;

/// Failure of the text completion capability
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion returned no content")]
    EmptyResponse,
}

/// Failure of the SQL execution capability.
///
/// Connection, timeout and runtime failures collapse into this one kind; the
/// database message is kept for diagnostics.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Database(String),

    #[error("statement exceeded timeout of {0:?}")]
    Timeout(Duration),

    #[error("connection unavailable: {0}")]
    Connection(String),
}

/// Failure of the cache backend. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache payload error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Stage-level failures, rendered into the pipeline state's error fields
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to understand query: {0}")]
    Intent(String),

    #[error("Failed to generate SQL: {0}")]
    SqlGeneration(String),

    #[error("Unsafe SQL rejected: {}", join_violations(.0))]
    SafetyViolation(Vec<Violation>),

    #[error("Database error: {0}")]
    Execution(#[from] ExecutionError),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
