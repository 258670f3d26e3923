//! Request entry point: cache lookup, pipeline run, response shaping

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::capability::{CacheStore, SqlExecutor, TextCompleter};
use crate::chart::ChartPlan;
use crate::orchestrator::Orchestrator;
use crate::profile::Shape;
use crate::state::PipelineState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub row_count: usize,
    pub columns: Vec<String>,
    pub shape: Option<Shape>,
    pub chart: Option<ChartPlan>,
}

/// Terminal response of one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated SQL, kept even when it was rejected or failed
    pub sql: String,
    pub chart_code: String,
    pub insight: String,
    pub result_summary: ResultSummary,
    #[serde(default)]
    pub cached: bool,
}

impl QueryResponse {
    pub fn from_state(state: &PipelineState) -> Self {
        let (row_count, columns) = match (&state.profile, &state.result_set) {
            (Some(profile), _) => (profile.row_count, profile.columns.clone()),
            (None, Some(result)) => (result.row_count, result.columns.clone()),
            (None, None) => (0, Vec::new()),
        };

        Self {
            sql: state.sql_query.clone().unwrap_or_default(),
            chart_code: state.chart_code.clone().unwrap_or_default(),
            insight: state.insight.clone().unwrap_or_default(),
            result_summary: ResultSummary {
                row_count,
                columns,
                shape: state.profile.as_ref().map(|p| p.shape),
                chart: state.chart_plan.clone(),
            },
            cached: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Error,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database: ComponentStatus,
    pub cache: ComponentStatus,
}

pub struct QueryService<C, E, S> {
    orchestrator: Orchestrator<C, E>,
    cache: Option<ResponseCache<S>>,
}

impl<C, E, S> QueryService<C, E, S>
where
    C: TextCompleter,
    E: SqlExecutor,
    S: CacheStore,
{
    pub fn new(orchestrator: Orchestrator<C, E>, cache: Option<ResponseCache<S>>) -> Self {
        Self { orchestrator, cache }
    }

    /// Answers a question. Never fails: pipeline failures are reported through
    /// the response's insight.
    pub async fn run_query(&self, user_text: &str, use_cache: bool) -> QueryResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("query", %request_id, cache = use_cache);
        self.answer(user_text, use_cache).instrument(span).await
    }

    async fn answer(&self, user_text: &str, use_cache: bool) -> QueryResponse {
        let cache = self.cache.as_ref().filter(|_| use_cache);

        if let Some(cache) = cache {
            if let Some(response) = cache.get(user_text).await {
                return QueryResponse {
                    cached: true,
                    ..response
                };
            }
        }

        let state = self.orchestrator.run(user_text).await;
        let response = QueryResponse::from_state(&state);

        match cache {
            Some(cache) if state.is_cacheable() => cache.set(user_text, &response).await,
            Some(_) => tracing::debug!("Skipping cache write for unsuccessful run"),
            None => {}
        }

        response
    }

    pub async fn health(&self) -> HealthReport {
        let database = match self.orchestrator.executor().ping().await {
            Ok(()) => ComponentStatus::Ok,
            Err(e) => {
                tracing::error!(error = %e, "Database health check failed");
                ComponentStatus::Error
            }
        };

        let cache = match &self.cache {
            None => ComponentStatus::Disabled,
            Some(cache) => match cache.ping().await {
                Ok(()) => ComponentStatus::Ok,
                Err(e) => {
                    tracing::error!(error = %e, "Cache health check failed");
                    ComponentStatus::Error
                }
            },
        };

        let status = if database == ComponentStatus::Error || cache == ComponentStatus::Error {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            database,
            cache,
        }
    }
}
