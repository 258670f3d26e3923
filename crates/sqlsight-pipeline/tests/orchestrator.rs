mod common;

use common::{category_totals, FakeExecutor, ScriptedCompleter};
use serde_json::json;
use sqlsight_pipeline::{
    ChartPlanMode, ChartType, Orchestrator, PipelineConfig, PipelineState, ResultSet, Shape,
};
use std::sync::Arc;

fn orchestrator(
    completer: ScriptedCompleter,
    executor: FakeExecutor,
) -> (Orchestrator<Arc<ScriptedCompleter>, Arc<FakeExecutor>>, Arc<ScriptedCompleter>, Arc<FakeExecutor>) {
    orchestrator_with(completer, executor, PipelineConfig::default())
}

fn orchestrator_with(
    completer: ScriptedCompleter,
    executor: FakeExecutor,
    config: PipelineConfig,
) -> (Orchestrator<Arc<ScriptedCompleter>, Arc<FakeExecutor>>, Arc<ScriptedCompleter>, Arc<FakeExecutor>) {
    let completer = Arc::new(completer);
    let executor = Arc::new(executor);
    let orchestrator = Orchestrator::new(completer.clone(), executor.clone(), config);
    (orchestrator, completer, executor)
}

fn assert_terminal_invariant(state: &PipelineState) {
    assert!(state.failure_count() <= 1, "more than one error field set: {:?}", state);
    assert!(state.insight.is_some());
    if state.is_failed() {
        assert!(state.chart_plan.is_none());
        assert!(state.chart_code.is_none());
    }
}

#[tokio::test]
async fn test_categorical_question_runs_to_bar_chart() {
    let (orchestrator, completer, executor) =
        orchestrator(ScriptedCompleter::default(), FakeExecutor::returning(category_totals()));

    let state = orchestrator.run("Revenue by category").await;

    assert_terminal_invariant(&state);
    assert!(!state.is_failed());
    assert!(state.sql_valid);
    assert_eq!(
        state.sql_query.as_deref(),
        Some("SELECT category, SUM(total_amount) AS total_amount FROM orders GROUP BY category LIMIT 10")
    );
    assert_eq!(executor.executed(), vec![state.sql_query.clone().unwrap()]);

    let profile = state.profile.as_ref().unwrap();
    assert_eq!(profile.shape, Shape::Categorical);
    let plan = state.chart_plan.as_ref().unwrap();
    assert_eq!(plan.chart_type, ChartType::Bar);
    assert_eq!(plan.x_axis, "category");

    assert_eq!(
        state.chart_code.as_deref(),
        Some("import plotly.graph_objects as go\nfig = go.Figure()")
    );
    assert_eq!(state.insight.as_deref(), Some(common::INSIGHT));
    // intent, sql, chart code, insight
    assert_eq!(completer.calls(), 4);
}

#[tokio::test]
async fn test_intent_failure_goes_straight_to_error_terminal() {
    let completer = ScriptedCompleter {
        intent: Ok("not json at all".into()),
        ..ScriptedCompleter::default()
    };
    let (orchestrator, completer, executor) =
        orchestrator(completer, FakeExecutor::returning(category_totals()));

    let state = orchestrator.run("???").await;

    assert_terminal_invariant(&state);
    let error = state.error.as_deref().unwrap();
    assert!(error.starts_with("Failed to understand query:"), "{}", error);
    assert!(state.sql_query.is_none());
    assert_eq!(completer.calls(), 1);
    assert_eq!(executor.calls(), 0);
    assert!(state.insight.unwrap().starts_with("I encountered an issue: Failed to understand query"));
}

#[tokio::test]
async fn test_loosely_shaped_intent_is_accepted() {
    for reply in [
        r#"{"metrics": ["total_amount"], "dimensions": null, "limit": 10}"#,
        r#"{"metrics": "total_amount", "dimensions": "category"}"#,
        r#"```json
{"metrics": ["total_amount"], "limit": "5"}
```"#,
    ] {
        let completer = ScriptedCompleter {
            intent: Ok(reply.into()),
            ..ScriptedCompleter::default()
        };
        let (orchestrator, _, executor) = orchestrator(completer, FakeExecutor::returning(category_totals()));

        let state = orchestrator.run("Revenue by category").await;

        assert_terminal_invariant(&state);
        assert!(!state.is_failed(), "{}: {:?}", reply, state.failure());
        assert!(state.intent.as_ref().unwrap().metrics.contains(&"total_amount".to_string()));
        assert_eq!(executor.calls(), 1);
    }
}

#[tokio::test]
async fn test_sql_generation_failure_is_reported() {
    let completer = ScriptedCompleter {
        sql: Err("rate limited".into()),
        ..ScriptedCompleter::default()
    };
    let (orchestrator, _, executor) = orchestrator(completer, FakeExecutor::returning(category_totals()));

    let state = orchestrator.run("Revenue by category").await;

    assert_terminal_invariant(&state);
    assert_eq!(
        state.sql_error.as_deref(),
        Some("Failed to generate SQL: completion request failed: rate limited")
    );
    assert!(!state.sql_valid);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_unsafe_sql_never_reaches_executor() {
    let (orchestrator, _, executor) = orchestrator(
        ScriptedCompleter::with_sql("DELETE FROM orders"),
        FakeExecutor::returning(category_totals()),
    );

    let state = orchestrator.run("remove all orders").await;

    assert_terminal_invariant(&state);
    assert_eq!(executor.calls(), 0);
    assert!(!state.sql_valid);
    let sql_error = state.sql_error.as_deref().unwrap();
    assert!(sql_error.contains("write/ddl statement not allowed: DELETE"), "{}", sql_error);
    assert!(sql_error.contains("forbidden keyword detected: DELETE"), "{}", sql_error);
    assert_eq!(state.sql_query.as_deref(), Some("DELETE FROM orders"));
}

#[tokio::test]
async fn test_missing_limit_is_rejected() {
    let (orchestrator, _, executor) = orchestrator(
        ScriptedCompleter::with_sql("SELECT * FROM orders"),
        FakeExecutor::returning(category_totals()),
    );

    let state = orchestrator.run("all orders").await;

    assert_eq!(executor.calls(), 0);
    assert!(state.sql_error.unwrap().contains("missing limit"));
}

#[tokio::test]
async fn test_execution_error_is_terminal() {
    let (orchestrator, completer, _) = orchestrator(
        ScriptedCompleter::default(),
        FakeExecutor::failing("Catalog Error: Table with name orderz does not exist!"),
    );

    let state = orchestrator.run("Revenue by category").await;

    assert_terminal_invariant(&state);
    assert_eq!(
        state.execution_error.as_deref(),
        Some("Database error: Catalog Error: Table with name orderz does not exist!")
    );
    assert!(state.profile.is_none());
    // intent and sql only
    assert_eq!(completer.calls(), 2);
}

#[tokio::test]
async fn test_ragged_result_gets_fixed_insight() {
    let ragged = ResultSet::new(
        vec!["category".into(), "total_amount".into()],
        vec![vec![json!("Books")]],
    );
    let (orchestrator, completer, _) = orchestrator(ScriptedCompleter::default(), FakeExecutor::returning(ragged));

    let state = orchestrator.run("Revenue by category").await;

    assert_eq!(state.profile.as_ref().unwrap().shape, Shape::Error);
    assert!(state.chart_plan.is_none());
    assert!(state.chart_code.is_none());
    let insight = state.insight.as_deref().unwrap();
    assert!(insight.starts_with("I encountered an issue:"), "{}", insight);
    assert!(insight.contains("expected 2"), "{}", insight);
    // intent and sql only
    assert_eq!(completer.calls(), 2);
}

#[tokio::test]
async fn test_zero_rows_is_empty_not_error() {
    let empty = ResultSet::new(vec!["category".into(), "total_amount".into()], Vec::new());
    let (orchestrator, completer, _) =
        orchestrator(ScriptedCompleter::default(), FakeExecutor::returning(empty));

    let state = orchestrator.run("Revenue by category in 1850").await;

    assert_terminal_invariant(&state);
    assert!(!state.is_failed());
    assert_eq!(state.profile.as_ref().unwrap().shape, Shape::Empty);
    assert!(state.chart_plan.is_none());
    assert!(state.chart_code.is_none());
    assert_eq!(state.insight.as_deref(), Some("No data found matching your query."));
    assert_eq!(completer.calls(), 2);
}

#[tokio::test]
async fn test_model_chart_plan_is_used_when_valid() {
    let completer = ScriptedCompleter {
        chart_plan: Ok(json!({
            "chart_type": "pie",
            "x_axis": "category",
            "y_axis": "total_amount",
            "title": "Revenue Share"
        })
        .to_string()),
        ..ScriptedCompleter::default()
    };
    let config = PipelineConfig {
        chart_planner: ChartPlanMode::Model,
        ..PipelineConfig::default()
    };
    let (orchestrator, _, _) =
        orchestrator_with(completer, FakeExecutor::returning(category_totals()), config);

    let state = orchestrator.run("Revenue share by category").await;

    let plan = state.chart_plan.unwrap();
    assert_eq!(plan.chart_type, ChartType::Pie);
    assert_eq!(plan.title, "Revenue Share");
    assert_eq!(plan.labels.y, "Total Amount");
}

#[tokio::test]
async fn test_model_chart_plan_falls_back_to_rules() {
    let completer = ScriptedCompleter {
        chart_plan: Ok(r#"{"chart_type": "line", "x_axis": "month", "y_axis": "revenue", "title": "t"}"#.into()),
        ..ScriptedCompleter::default()
    };
    let config = PipelineConfig {
        chart_planner: ChartPlanMode::Model,
        ..PipelineConfig::default()
    };
    let (orchestrator, _, _) =
        orchestrator_with(completer, FakeExecutor::returning(category_totals()), config);

    let state = orchestrator.run("Revenue by category").await;

    let plan = state.chart_plan.unwrap();
    assert_eq!(plan.chart_type, ChartType::Bar);
    assert_eq!(plan.title, "Comparison");
}

#[tokio::test]
async fn test_chart_code_and_insight_fall_back() {
    let completer = ScriptedCompleter {
        chart_code: Err("timeout".into()),
        insight: Err("timeout".into()),
        ..ScriptedCompleter::default()
    };
    let (orchestrator, _, _) = orchestrator(completer, FakeExecutor::returning(category_totals()));

    let state = orchestrator.run("Revenue by category").await;

    assert!(!state.is_failed());
    let code = state.chart_code.unwrap();
    assert!(code.contains("go.Bar(x=df['category'], y=df['total_amount'])"), "{}", code);
    assert_eq!(state.insight.as_deref(), Some("Found 2 results for your query."));
}

#[tokio::test]
async fn test_every_input_reaches_done() {
    let replies = [
        "",
        "SELECT 1",
        "SELECT * FROM orders LIMIT 50000",
        "SELECT * FROM pg_stat_activity LIMIT 10",
        "SELECT * FROM orders LIMIT 5; DROP TABLE orders",
        "SELEC broken",
    ];
    for reply in replies {
        let (orchestrator, _, executor) = orchestrator(
            ScriptedCompleter::with_sql(reply),
            FakeExecutor::returning(category_totals()),
        );
        let state = orchestrator.run("anything").await;
        assert_terminal_invariant(&state);
        assert!(state.is_failed(), "expected rejection for {:?}", reply);
        assert_eq!(executor.calls(), 0, "executed {:?}", reply);
    }
}
