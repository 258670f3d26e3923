//! Response cache keyed on the normalized question
//!
//! Backend failures never reach the caller: failed or slow reads become
//! misses and failed writes are logged and dropped.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capability::CacheStore;
use crate::error::CacheError;
use crate::service::QueryResponse;

pub const KEY_PREFIX: &str = "analytics:";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    /// Bumped whenever the database schema changes; part of every key
    pub schema_version: String,
    pub max_capacity: u64,
    pub op_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            schema_version: "v1".to_string(),
            max_capacity: 10_000,
            op_timeout_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Trim, collapse inner whitespace, lowercase
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `analytics:` followed by the hex SHA-256 of `normalized:schema_version`
pub fn cache_key(query: &str, schema_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(query).as_bytes());
    hasher.update(b":");
    hasher.update(schema_version.as_bytes());
    format!("{}{:x}", KEY_PREFIX, hasher.finalize())
}

pub struct ResponseCache<S> {
    store: S,
    ttl: Duration,
    schema_version: String,
    op_timeout: Duration,
}

impl<S: CacheStore> ResponseCache<S> {
    pub fn new(store: S, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: config.ttl(),
            schema_version: config.schema_version.clone(),
            op_timeout: config.op_timeout(),
        }
    }

    pub fn key(&self, query: &str) -> String {
        cache_key(query, &self.schema_version)
    }

    pub async fn get(&self, query: &str) -> Option<QueryResponse> {
        let key = self.key(query);
        match self.try_get(&key).await {
            Ok(Some(response)) => {
                tracing::info!(key = %key, "Cache hit");
                Some(response)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, query: &str, response: &QueryResponse) {
        let key = self.key(query);
        if let Err(e) = self.try_set(&key, response).await {
            tracing::warn!(key = %key, error = %e, "Cache write dropped");
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        tokio::time::timeout(self.op_timeout, self.store.ping())
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
    }

    async fn try_get(&self, key: &str) -> Result<Option<QueryResponse>, CacheError> {
        let bytes = tokio::time::timeout(self.op_timeout, self.store.get(key))
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))??;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn try_set(&self, key: &str, response: &QueryResponse) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(response)?;
        tokio::time::timeout(self.op_timeout, self.store.set(key, bytes, self.ttl))
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Expires each entry after the ttl it was written with
struct PerEntryTtl;

impl Expiry<String, StoredEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &StoredEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store backed by moka
#[derive(Clone)]
pub struct MemoryStore {
    inner: Cache<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(CacheConfig::default().max_capacity)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.inner.get(key).await.map(|entry| entry.bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = StoredEntry {
            bytes: value.into(),
            ttl,
        };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }
}
