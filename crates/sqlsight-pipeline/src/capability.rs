//! External capabilities the pipeline depends on
//!
//! The pipeline never reaches these through globals: the service is generic
//! over each trait and receives concrete implementations at construction.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CacheError, CompletionError, ExecutionError};
use crate::state::ResultSet;

/// Text completion. Output is untrusted.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, system_prompt: &str, context: &str) -> Result<String, CompletionError>;
}

/// Read-only SQL execution bound to pooled connections
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<ResultSet, ExecutionError>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> Result<(), ExecutionError> {
        self.execute("SELECT 1", Duration::from_secs(5)).await.map(|_| ())
    }
}

/// Byte-oriented key-value store with per-entry ttl
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[async_trait]
impl<T: TextCompleter + ?Sized> TextCompleter for Arc<T> {
    async fn complete(&self, system_prompt: &str, context: &str) -> Result<String, CompletionError> {
        (**self).complete(system_prompt, context).await
    }
}

#[async_trait]
impl<T: SqlExecutor + ?Sized> SqlExecutor for Arc<T> {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<ResultSet, ExecutionError> {
        (**self).execute(sql, timeout).await
    }

    async fn ping(&self) -> Result<(), ExecutionError> {
        (**self).ping().await
    }
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        (**self).ping().await
    }
}
