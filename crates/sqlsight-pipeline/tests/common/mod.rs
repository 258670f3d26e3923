//! Scripted capabilities shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sqlsight_pipeline::prompts;
use sqlsight_pipeline::{
    CacheError, CacheStore, CompletionError, ExecutionError, ResultSet, SqlExecutor, TextCompleter,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const INTENT_JSON: &str = r#"{"metrics": ["total_amount"], "dimensions": ["category"], "aggregation": "sum", "limit": 10}"#;
pub const CATEGORY_SQL: &str =
    "```sql\nSELECT category, SUM(total_amount) AS total_amount FROM orders GROUP BY category LIMIT 10\n```";
pub const CHART_CODE: &str = "```python\nimport plotly.graph_objects as go\nfig = go.Figure()\n```";
pub const INSIGHT: &str = "Books lead revenue at 120.5.";

/// Answers each prompt with a fixed reply; `Err` simulates a capability failure
pub struct ScriptedCompleter {
    pub intent: Result<String, String>,
    pub sql: Result<String, String>,
    pub chart_plan: Result<String, String>,
    pub chart_code: Result<String, String>,
    pub insight: Result<String, String>,
    pub calls: AtomicUsize,
}

impl Default for ScriptedCompleter {
    fn default() -> Self {
        Self {
            intent: Ok(INTENT_JSON.to_string()),
            sql: Ok(CATEGORY_SQL.to_string()),
            chart_plan: Err("chart planning not scripted".to_string()),
            chart_code: Ok(CHART_CODE.to_string()),
            insight: Ok(INSIGHT.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedCompleter {
    pub fn with_sql(sql: &str) -> Self {
        Self {
            sql: Ok(sql.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextCompleter for ScriptedCompleter {
    async fn complete(&self, system_prompt: &str, _context: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if system_prompt == prompts::INTENT {
            &self.intent
        } else if system_prompt.starts_with(prompts::SQL_GENERATION) {
            &self.sql
        } else if system_prompt == prompts::CHART_PLAN {
            &self.chart_plan
        } else if system_prompt == prompts::CHART_CODE {
            &self.chart_code
        } else if system_prompt == prompts::INSIGHT {
            &self.insight
        } else {
            return Err(CompletionError::Request("unexpected prompt".into()));
        };
        reply.clone().map_err(CompletionError::Request)
    }
}

pub fn category_totals() -> ResultSet {
    ResultSet::new(
        vec!["category".into(), "total_amount".into()],
        vec![
            vec![json!("Books"), json!(120.5)],
            vec![json!("Games"), json!(80.0)],
        ],
    )
}

/// Returns a fixed result and records every statement it receives
pub struct FakeExecutor {
    result: Result<ResultSet, String>,
    calls: AtomicUsize,
    executed: std::sync::Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn returning(result: ResultSet) -> Self {
        Self {
            result: Ok(result),
            calls: AtomicUsize::new(0),
            executed: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            executed: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for FakeExecutor {
    async fn execute(&self, sql: &str, _timeout: Duration) -> Result<ResultSet, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(sql.to_string());
        self.result.clone().map_err(ExecutionError::Database)
    }

    async fn ping(&self) -> Result<(), ExecutionError> {
        self.result
            .as_ref()
            .map(|_| ())
            .map_err(|e| ExecutionError::Connection(e.clone()))
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

/// Store that never answers within any reasonable timeout
pub struct StalledStore;

#[async_trait]
impl CacheStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}
