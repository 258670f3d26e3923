//! Stage functions
//!
//! Every stage takes the state by value and returns the next one. Capability
//! failures are converted into the stage's error field here, so no stage can
//! abort the run.

use serde_json::json;
use sqlsight_safety::SafetyValidator;
use std::time::Duration;

use crate::capability::{SqlExecutor, TextCompleter};
use crate::chart::{self, ChartPlan, ChartPlanMode};
use crate::error::StageError;
use crate::profile::{self, Shape};
use crate::prompts;
use crate::state::{Intent, PipelineState};

pub const NO_DATA_INSIGHT: &str = "No data found matching your query.";

/// Natural language question -> structured intent
pub async fn extract_intent<C: TextCompleter>(completer: &C, state: PipelineState) -> PipelineState {
    if state.error.is_some() {
        return state;
    }
    tracing::info!(query = %state.user_query, "Extracting intent");

    let context = format!("Query: {}", state.user_query);
    let intent = match completer.complete(prompts::INTENT, &context).await {
        Ok(reply) => serde_json::from_str::<Intent>(strip_code_fences(&reply))
            .map_err(|e| StageError::Intent(e.to_string())),
        Err(e) => Err(StageError::Intent(e.to_string())),
    };

    match intent {
        Ok(intent) => {
            tracing::debug!(?intent, "Extracted intent");
            PipelineState {
                intent: Some(intent),
                error: None,
                ..state
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Intent extraction failed");
            PipelineState {
                intent: None,
                error: Some(e.to_string()),
                ..state
            }
        }
    }
}

/// Intent and question -> candidate SQL text. The result is untrusted.
pub async fn generate_sql<C: TextCompleter>(
    completer: &C,
    schema_context: &str,
    state: PipelineState,
) -> PipelineState {
    if state.error.is_some() {
        return state;
    }
    let Some(intent) = state.intent.as_ref() else {
        return PipelineState {
            error: Some(StageError::Intent("no intent available".into()).to_string()),
            ..state
        };
    };

    let intent_json = serde_json::to_string_pretty(intent).unwrap_or_default();
    let context = format!(
        "Generate a SQL query for this intent:\n\n{}\n\nOriginal question: {}",
        intent_json, state.user_query
    );

    match completer
        .complete(&prompts::sql_generation(schema_context), &context)
        .await
    {
        Ok(reply) => {
            let sql = strip_code_fences(&reply).trim_end_matches(';').trim().to_string();
            tracing::info!(sql = %sql, "Generated SQL");
            PipelineState {
                sql_query: Some(sql),
                sql_valid: false,
                sql_error: None,
                ..state
            }
        }
        Err(e) => {
            let e = StageError::SqlGeneration(e.to_string());
            tracing::error!(error = %e, "SQL generation failed");
            PipelineState {
                sql_query: None,
                sql_valid: false,
                sql_error: Some(e.to_string()),
                ..state
            }
        }
    }
}

/// Safety gate: only a state leaving here with `sql_valid` may execute
pub fn validate_sql(validator: &SafetyValidator, state: PipelineState) -> PipelineState {
    if state.error.is_some() || state.sql_error.is_some() {
        return PipelineState {
            sql_valid: false,
            ..state
        };
    }
    let Some(sql) = state.sql_query.as_deref() else {
        return PipelineState {
            sql_valid: false,
            sql_error: Some("No SQL query to validate".to_string()),
            ..state
        };
    };

    let verdict = validator.validate(sql);
    if verdict.is_valid {
        PipelineState {
            sql_valid: true,
            sql_error: None,
            ..state
        }
    } else {
        let e = StageError::SafetyViolation(verdict.violations);
        tracing::warn!(error = %e, "SQL rejected by safety gate");
        PipelineState {
            sql_valid: false,
            sql_error: Some(e.to_string()),
            ..state
        }
    }
}

pub async fn execute_sql<E: SqlExecutor>(
    executor: &E,
    timeout: Duration,
    state: PipelineState,
) -> PipelineState {
    let Some(sql) = state.sql_query.clone().filter(|_| state.sql_valid) else {
        return PipelineState {
            execution_error: Some("Database error: statement was not validated".to_string()),
            ..state
        };
    };

    match executor.execute(&sql, timeout).await {
        Ok(result) => {
            tracing::info!(rows = result.row_count, columns = result.columns.len(), "Executed SQL");
            PipelineState {
                result_set: Some(result),
                execution_error: None,
                ..state
            }
        }
        Err(e) => {
            let e = StageError::from(e);
            tracing::error!(error = %e, "SQL execution failed");
            PipelineState {
                result_set: None,
                execution_error: Some(e.to_string()),
                ..state
            }
        }
    }
}

pub fn profile_result(state: PipelineState) -> PipelineState {
    let profile = state.result_set.as_ref().map(profile::profile);
    PipelineState { profile, ..state }
}

/// Chart plan for non-empty results. In model mode an unusable reply falls
/// back to the rule planner.
pub async fn plan_chart<C: TextCompleter>(
    completer: &C,
    mode: ChartPlanMode,
    state: PipelineState,
) -> PipelineState {
    let Some(profile) = state.profile.as_ref() else {
        return PipelineState {
            chart_plan: None,
            ..state
        };
    };
    if matches!(profile.shape, Shape::Empty | Shape::Error) {
        return PipelineState {
            chart_plan: None,
            ..state
        };
    }

    let plan = match mode {
        ChartPlanMode::Rules => chart::plan(profile),
        ChartPlanMode::Model => match model_chart_plan(completer, &state).await {
            Some(plan) => plan,
            None => {
                tracing::warn!("Model chart plan unusable, using rule planner");
                chart::plan(profile)
            }
        },
    };
    tracing::info!(chart_type = plan.chart_type.as_str(), x = %plan.x_axis, y = %plan.y_axis, "Planned chart");

    PipelineState {
        chart_plan: Some(plan),
        ..state
    }
}

async fn model_chart_plan<C: TextCompleter>(completer: &C, state: &PipelineState) -> Option<ChartPlan> {
    let profile = state.profile.as_ref()?;
    let context = json!({
        "question": state.user_query,
        "shape": profile.shape,
        "row_count": profile.row_count,
        "columns": profile.columns,
        "sample": profile.sample,
        "intent": state.intent,
    });

    let reply = match completer.complete(prompts::CHART_PLAN, &context.to_string()).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "Chart planning completion failed");
            return None;
        }
    };
    serde_json::from_str::<ChartPlan>(strip_code_fences(&reply))
        .ok()?
        .conform_to(profile)
}

/// Plotly code for the chart plan, with a template figure when the
/// completion fails
pub async fn generate_chart_code<C: TextCompleter>(completer: &C, state: PipelineState) -> PipelineState {
    let (Some(plan), Some(profile)) = (state.chart_plan.as_ref(), state.profile.as_ref()) else {
        return PipelineState {
            chart_code: None,
            ..state
        };
    };

    let sample: Vec<_> = profile.sample.iter().take(2).collect();
    let context = format!(
        "Visualization plan:\n{}\n\nColumns: {}\nRow count: {}\nSample:\n{}\n\nGenerate complete Plotly code for a {} chart.",
        serde_json::to_string_pretty(plan).unwrap_or_default(),
        profile.columns.join(", "),
        profile.row_count,
        serde_json::to_string_pretty(&sample).unwrap_or_default(),
        plan.chart_type.as_str(),
    );

    let code = match completer.complete(prompts::CHART_CODE, &context).await {
        Ok(reply) if !strip_code_fences(&reply).is_empty() => strip_code_fences(&reply).to_string(),
        Ok(_) => {
            tracing::warn!("Chart code completion was empty, using template");
            fallback_chart_code(plan)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Chart code completion failed, using template");
            fallback_chart_code(plan)
        }
    };
    tracing::info!(chars = code.len(), "Generated chart code");

    PipelineState {
        chart_code: Some(code),
        ..state
    }
}

pub fn fallback_chart_code(plan: &ChartPlan) -> String {
    format!(
        r#"import plotly.graph_objects as go

fig = go.Figure(data=[
    go.Bar(x=df[{x}], y=df[{y}])
])

fig.update_layout(
    title={title},
    xaxis_title={x_label},
    yaxis_title={y_label},
    template='plotly_white'
)
"#,
        x = py_str(&plan.x_axis),
        y = py_str(&plan.y_axis),
        title = py_str(&plan.title),
        x_label = py_str(&plan.labels.x),
        y_label = py_str(&plan.labels.y),
    )
}

/// Single-quoted Python string literal
fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

pub async fn generate_insight<C: TextCompleter>(completer: &C, state: PipelineState) -> PipelineState {
    let Some(profile) = state.profile.as_ref() else {
        return state;
    };
    if profile.shape == Shape::Empty {
        return PipelineState {
            insight: Some(NO_DATA_INSIGHT.to_string()),
            ..state
        };
    }
    if profile.shape == Shape::Error {
        let message = profile.message.as_deref().unwrap_or("result could not be profiled");
        return PipelineState {
            insight: Some(format!("I encountered an issue: {}", message)),
            ..state
        };
    }

    let context = format!(
        "User question: {}\n\nData summary:\n- {} results\n- Shape: {}\n\nTop results:\n{}\n\nSQL query used:\n{}",
        state.user_query,
        profile.row_count,
        profile.shape,
        serde_json::to_string_pretty(&profile.sample).unwrap_or_default(),
        state.sql_query.as_deref().unwrap_or_default(),
    );

    let insight = match completer.complete(prompts::INSIGHT, &context).await {
        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
        Ok(_) => format!("Found {} results for your query.", profile.row_count),
        Err(e) => {
            tracing::warn!(error = %e, "Insight completion failed");
            format!("Found {} results for your query.", profile.row_count)
        }
    };

    PipelineState {
        insight: Some(insight),
        ..state
    }
}

/// Turns the first recorded failure into the user-facing insight
pub fn error_terminal(state: PipelineState) -> PipelineState {
    let message = state.failure().unwrap_or("Unknown error").to_string();
    tracing::error!(error = %message, "Pipeline failed");
    PipelineState {
        insight: Some(format!("I encountered an issue: {}", message)),
        chart_plan: None,
        chart_code: None,
        ..state
    }
}

/// Body of the first fenced code block, or the trimmed text when unfenced.
/// A language tag on the opening fence is dropped.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let body = match after.find('\n') {
        Some(newline) if is_language_tag(&after[..newline]) => &after[newline + 1..],
        _ => after,
    };
    let end = body.find("```").unwrap_or(body.len());
    body[..end].trim()
}

fn is_language_tag(line: &str) -> bool {
    let line = line.trim();
    line.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
