//! Values threaded through the pipeline

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::chart::ChartPlan;
use crate::profile::{ResultProfile, Shape};

/// Structured reading of the user's question.
///
/// Completions rarely agree on field shapes, so every field accepts null,
/// scalars and lists; only a reply that is not a JSON object is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intent {
    #[serde(deserialize_with = "string_list")]
    pub metrics: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub dimensions: Vec<String>,
    pub filters: Value,
    #[serde(deserialize_with = "loose_string")]
    pub aggregation: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub time_range: Option<String>,
    #[serde(deserialize_with = "loose_limit")]
    pub limit: Option<u64>,
    #[serde(deserialize_with = "loose_string")]
    pub sort: Option<String>,
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_text).collect(),
        other => value_text(other).into_iter().collect(),
    })
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(value_text(Value::deserialize(deserializer)?))
}

fn loose_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Tabular result of one executed statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-request pipeline state.
///
/// Stages take the state by value and hand back a rebuilt one, so a value is
/// never shared between stages or requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub user_query: String,
    pub intent: Option<Intent>,
    pub sql_query: Option<String>,
    pub sql_valid: bool,
    pub sql_error: Option<String>,
    pub result_set: Option<ResultSet>,
    pub execution_error: Option<String>,
    pub profile: Option<ResultProfile>,
    pub chart_plan: Option<ChartPlan>,
    pub chart_code: Option<String>,
    pub insight: Option<String>,
    pub error: Option<String>,
}

impl PipelineState {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Self::default()
        }
    }

    /// First recorded failure, checked in error → sql_error → execution_error order
    pub fn failure(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.sql_error.as_deref())
            .or(self.execution_error.as_deref())
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }

    /// Whether the outcome may be served again from the response cache.
    /// A result that could not be profiled is not.
    pub fn is_cacheable(&self) -> bool {
        !self.is_failed() && self.profile.as_ref().map_or(true, |p| p.shape != Shape::Error)
    }

    /// Number of error fields currently set
    pub fn failure_count(&self) -> usize {
        [&self.error, &self.sql_error, &self.execution_error]
            .iter()
            .filter(|field| field.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_precedence() {
        let state = PipelineState {
            sql_error: Some("bad sql".into()),
            execution_error: Some("db down".into()),
            ..PipelineState::new("q")
        };
        assert_eq!(state.failure(), Some("bad sql"));
        assert_eq!(state.failure_count(), 2);

        let state = PipelineState {
            error: Some("no intent".into()),
            ..state
        };
        assert_eq!(state.failure(), Some("no intent"));
    }

    #[test]
    fn test_unprofilable_result_is_not_cacheable() {
        let ragged = crate::profile::profile(&ResultSet::new(
            vec!["a".into(), "b".into()],
            vec![vec![serde_json::json!(1)]],
        ));
        let state = PipelineState {
            profile: Some(ragged),
            ..PipelineState::new("q")
        };
        assert!(!state.is_failed());
        assert!(!state.is_cacheable());
        assert!(PipelineState::new("q").is_cacheable());
    }

    #[test]
    fn test_new_state_is_clean() {
        let state = PipelineState::new("revenue by month");
        assert_eq!(state.user_query, "revenue by month");
        assert!(!state.sql_valid);
        assert!(!state.is_failed());
    }

    #[test]
    fn test_intent_tolerates_missing_fields() {
        let intent: Intent = serde_json::from_str(r#"{"metrics": ["total_amount"], "limit": 5}"#).unwrap();
        assert_eq!(intent.metrics, vec!["total_amount"]);
        assert_eq!(intent.limit, Some(5));
        assert!(intent.dimensions.is_empty());
        assert!(intent.filters.is_null());
    }

    #[test]
    fn test_intent_accepts_loose_field_shapes() {
        let intent: Intent = serde_json::from_str(
            r#"{"metrics": "total_amount", "dimensions": null, "aggregation": null, "limit": "5", "sort": ["desc"]}"#,
        )
        .unwrap();
        assert_eq!(intent.metrics, vec!["total_amount"]);
        assert!(intent.dimensions.is_empty());
        assert_eq!(intent.aggregation, None);
        assert_eq!(intent.limit, Some(5));
        assert_eq!(intent.sort.as_deref(), Some(r#"["desc"]"#));

        let intent: Intent = serde_json::from_str(r#"{"limit": "all", "metrics": [1, null, "revenue"]}"#).unwrap();
        assert_eq!(intent.limit, None);
        assert_eq!(intent.metrics, vec!["1", "revenue"]);
    }

    #[test]
    fn test_intent_rejects_non_object() {
        assert!(serde_json::from_str::<Intent>(r#""total sales""#).is_err());
    }

    #[test]
    fn test_result_set_counts_rows() {
        let result = ResultSet::new(
            vec!["id".into()],
            vec![vec![serde_json::json!(1)], vec![serde_json::json!(2)]],
        );
        assert_eq!(result.row_count, 2);
        assert!(!result.is_empty());
    }
}
