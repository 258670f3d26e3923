//! Pipeline state machine
//!
//! ```text
//! Intent -> SqlGeneration -> SafetyGate -> Execute -> Profile -> ChartPlan -> ChartCode -> Insight -> Done
//!   |             |               |            |
//!   +-------------+---------------+------------+-------> ErrorTerminal -> Done
//! ```

use serde::{Deserialize, Serialize};
use sqlsight_safety::{SafetyConfig, SafetyValidator};
use std::time::Duration;

use crate::capability::{SqlExecutor, TextCompleter};
use crate::chart::ChartPlanMode;
use crate::prompts::DEFAULT_SCHEMA_CONTEXT;
use crate::stages;
use crate::state::PipelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intent,
    SqlGeneration,
    SafetyGate,
    Execute,
    Profile,
    ChartPlan,
    ChartCode,
    Insight,
    ErrorTerminal,
    Done,
}

/// Transition function. Pure: depends only on the finished stage and the
/// state it produced.
pub fn next_stage(stage: Stage, state: &PipelineState) -> Stage {
    match stage {
        Stage::Intent if state.error.is_some() => Stage::ErrorTerminal,
        Stage::Intent => Stage::SqlGeneration,
        Stage::SqlGeneration if state.error.is_some() => Stage::ErrorTerminal,
        Stage::SqlGeneration => Stage::SafetyGate,
        Stage::SafetyGate if state.sql_valid => Stage::Execute,
        Stage::SafetyGate => Stage::ErrorTerminal,
        Stage::Execute if state.execution_error.is_none() && state.result_set.is_some() => {
            Stage::Profile
        }
        Stage::Execute => Stage::ErrorTerminal,
        Stage::Profile => Stage::ChartPlan,
        Stage::ChartPlan => Stage::ChartCode,
        Stage::ChartCode => Stage::Insight,
        Stage::Insight | Stage::ErrorTerminal | Stage::Done => Stage::Done,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub safety: SafetyConfig,
    pub statement_timeout_ms: u64,
    pub chart_planner: ChartPlanMode,
    /// Schema description handed to SQL generation
    pub schema_context: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            safety: SafetyConfig::default(),
            statement_timeout_ms: 30_000,
            chart_planner: ChartPlanMode::default(),
            schema_context: DEFAULT_SCHEMA_CONTEXT.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

/// Runs one question through every stage. Generic over the completion and
/// execution capabilities.
pub struct Orchestrator<C, E> {
    completer: C,
    executor: E,
    validator: SafetyValidator,
    config: PipelineConfig,
}

impl<C: TextCompleter, E: SqlExecutor> Orchestrator<C, E> {
    pub fn new(completer: C, executor: E, config: PipelineConfig) -> Self {
        Self {
            completer,
            executor,
            validator: SafetyValidator::new(config.safety.clone()),
            config,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Always reaches `Done`; failures end up in the returned state.
    pub async fn run(&self, user_query: &str) -> PipelineState {
        let mut state = PipelineState::new(user_query);
        let mut stage = Stage::Intent;

        while stage != Stage::Done {
            tracing::debug!(stage = ?stage, "Entering stage");
            state = self.step(stage, state).await;
            stage = next_stage(stage, &state);
        }

        tracing::info!(failed = state.is_failed(), "Pipeline finished");
        state
    }

    async fn step(&self, stage: Stage, state: PipelineState) -> PipelineState {
        match stage {
            Stage::Intent => stages::extract_intent(&self.completer, state).await,
            Stage::SqlGeneration => {
                stages::generate_sql(&self.completer, &self.config.schema_context, state).await
            }
            Stage::SafetyGate => stages::validate_sql(&self.validator, state),
            Stage::Execute => {
                stages::execute_sql(&self.executor, self.config.statement_timeout(), state).await
            }
            Stage::Profile => stages::profile_result(state),
            Stage::ChartPlan => {
                stages::plan_chart(&self.completer, self.config.chart_planner, state).await
            }
            Stage::ChartCode => stages::generate_chart_code(&self.completer, state).await,
            Stage::Insight => stages::generate_insight(&self.completer, state).await,
            Stage::ErrorTerminal => stages::error_terminal(state),
            Stage::Done => state,
        }
    }
}
