//! Result shape classification
//!
//! The shape heuristics match on column names only. "ranking" in particular
//! is a substring match on aggregate-looking names and will misfire on
//! columns such as `account_count_id`; it is kept as a known weak heuristic.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::state::ResultSet;

const TIME_TOKENS: &[&str] = &["date", "time"];
const AGGREGATE_TOKENS: &[&str] = &["total", "sum", "count"];
const SAMPLE_ROWS: usize = 3;

/// Shape category of a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Empty,
    TimeSeries,
    Categorical,
    Ranking,
    Tabular,
    Error,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Empty => "empty",
            Shape::TimeSeries => "time_series",
            Shape::Categorical => "categorical",
            Shape::Ranking => "ranking",
            Shape::Tabular => "tabular",
            Shape::Error => "error",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred value type of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Null,
    Boolean,
    Integer,
    Float,
    Temporal,
    Text,
    Nested,
    Mixed,
}

/// Summary of a result set, derived once and read-only afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub shape: Shape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
    pub sample: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Classify a result set.
///
/// Never fails: a malformed result yields a profile with shape `Error`.
pub fn profile(result: &ResultSet) -> ResultProfile {
    let base = ResultProfile {
        row_count: result.rows.len(),
        column_count: result.columns.len(),
        columns: result.columns.clone(),
        column_types: Vec::new(),
        shape: Shape::Empty,
        time_column: None,
        sample: Vec::new(),
        message: None,
    };

    if result.rows.is_empty() {
        return ResultProfile {
            message: Some("Query returned no results".to_string()),
            ..base
        };
    }

    if let Some((index, row)) = result
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != result.columns.len())
    {
        tracing::warn!(row = index, "Result row width does not match column count");
        return ResultProfile {
            shape: Shape::Error,
            message: Some(format!(
                "row {} has {} values, expected {}",
                index,
                row.len(),
                result.columns.len()
            )),
            ..base
        };
    }

    let column_types = (0..result.columns.len())
        .map(|idx| infer_column_type(result.rows.iter().map(|row| &row[idx])))
        .collect();

    let time_column = result
        .columns
        .iter()
        .find(|name| name_has_token(name, TIME_TOKENS))
        .cloned();

    let shape = if time_column.is_some() {
        Shape::TimeSeries
    } else if result.columns.len() == 2 {
        Shape::Categorical
    } else if result.columns.iter().any(|name| name_has_token(name, AGGREGATE_TOKENS)) {
        Shape::Ranking
    } else {
        Shape::Tabular
    };

    let sample = result
        .rows
        .iter()
        .take(SAMPLE_ROWS)
        .map(|row| {
            result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<Map<String, Value>>()
        })
        .collect();

    tracing::info!(shape = %shape, rows = base.row_count, "Profiled result");

    ResultProfile {
        column_types,
        shape,
        time_column,
        sample,
        ..base
    }
}

fn name_has_token(name: &str, tokens: &[&str]) -> bool {
    let lower = name.to_lowercase();
    tokens.iter().any(|token| lower.contains(token))
}

fn infer_column_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    values.map(value_type).fold(ColumnType::Null, merge_types)
}

fn value_type(value: &Value) -> ColumnType {
    match value {
        Value::Null => ColumnType::Null,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
        Value::Number(_) => ColumnType::Float,
        Value::String(s) if looks_temporal(s) => ColumnType::Temporal,
        Value::String(_) => ColumnType::Text,
        Value::Array(_) | Value::Object(_) => ColumnType::Nested,
    }
}

fn merge_types(acc: ColumnType, next: ColumnType) -> ColumnType {
    match (acc, next) {
        (ColumnType::Null, other) | (other, ColumnType::Null) => other,
        (a, b) if a == b => a,
        (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => {
            ColumnType::Float
        }
        _ => ColumnType::Mixed,
    }
}

fn looks_temporal(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
}
