//! Chart encoding selection

use serde::{Deserialize, Serialize};

use crate::profile::{ResultProfile, Shape};

const PLACEHOLDER_X: &str = "x";
const PLACEHOLDER_Y: &str = "y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Scatter,
    Pie,
    Table,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
            ChartType::Table => "table",
        }
    }
}

/// Who picks the chart encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartPlanMode {
    #[default]
    Rules,
    Model,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartLabels {
    pub x: String,
    pub y: String,
}

/// Chart encoding handed to the chart-code stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPlan {
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub title: String,
    #[serde(default)]
    pub labels: ChartLabels,
}

impl ChartPlan {
    fn new(chart_type: ChartType, x_axis: &str, y_axis: &str, title: &str) -> Self {
        Self {
            chart_type,
            x_axis: x_axis.to_string(),
            y_axis: y_axis.to_string(),
            title: title.to_string(),
            labels: ChartLabels {
                x: humanize(x_axis),
                y: humanize(y_axis),
            },
        }
    }

    /// Checks a plan proposed from outside against the profiled columns,
    /// filling in missing labels.
    pub fn conform_to(mut self, profile: &ResultProfile) -> Option<Self> {
        let known = |name: &str| profile.columns.iter().any(|column| column == name);
        if !known(&self.x_axis) || !known(&self.y_axis) {
            return None;
        }
        if self.labels.x.is_empty() {
            self.labels.x = humanize(&self.x_axis);
        }
        if self.labels.y.is_empty() {
            self.labels.y = humanize(&self.y_axis);
        }
        Some(self)
    }
}

/// Rule-based plan. Never fails; missing columns degrade to placeholders.
pub fn plan(profile: &ResultProfile) -> ChartPlan {
    let columns = &profile.columns;
    let first = columns.first().map(String::as_str);
    let second = columns.get(1).map(String::as_str);

    match profile.shape {
        Shape::TimeSeries => {
            let x = profile.time_column.as_deref().or(first).unwrap_or(PLACEHOLDER_X);
            let y = columns
                .iter()
                .map(String::as_str)
                .find(|column| *column != x)
                .unwrap_or(PLACEHOLDER_Y);
            ChartPlan::new(ChartType::Line, x, y, "Trend Over Time")
        }
        Shape::Categorical => ChartPlan::new(
            ChartType::Bar,
            first.unwrap_or(PLACEHOLDER_X),
            second.unwrap_or(PLACEHOLDER_Y),
            "Comparison",
        ),
        _ => ChartPlan::new(
            ChartType::Bar,
            first.unwrap_or(PLACEHOLDER_X),
            second.unwrap_or(PLACEHOLDER_Y),
            "Results",
        ),
    }
}

/// `total_amount` -> `Total Amount`
pub fn humanize(column: &str) -> String {
    column
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
