//! Question-to-chart analytics pipeline
//!
//! A question is turned into an intent, then into SQL that must pass the
//! safety gate before it reaches the database. Results are profiled, charted
//! and summarised. Capabilities (completion, execution, cache storage) are
//! injected as trait implementations.

pub mod cache;
pub mod capability;
pub mod chart;
pub mod error;
pub mod orchestrator;
pub mod profile;
pub mod prompts;
pub mod service;
pub mod stages;
pub mod state;

pub use cache::{cache_key, normalize_query, CacheConfig, MemoryStore, ResponseCache};
pub use capability::{CacheStore, SqlExecutor, TextCompleter};
pub use chart::{ChartLabels, ChartPlan, ChartPlanMode, ChartType};
pub use error::{CacheError, CompletionError, ExecutionError, StageError};
pub use orchestrator::{next_stage, Orchestrator, PipelineConfig, Stage};
pub use profile::{ColumnType, ResultProfile, Shape};
pub use service::{ComponentStatus, HealthReport, HealthStatus, QueryResponse, QueryService, ResultSummary};
pub use state::{Intent, PipelineState, ResultSet};
