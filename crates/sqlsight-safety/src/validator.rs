//! Two-pass statement validator

use sqlparser::ast::{
    Expr, ObjectName, Query, SetExpr, Statement, TableFactor, TableWithJoins, Value, Visit,
    Visitor,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::fmt;
use std::ops::ControlFlow;

use crate::rules::{forbidden_keywords, SafetyConfig, Violation};

/// Outcome of validating one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

impl ValidationVerdict {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            is_valid: violations.is_empty(),
            violations,
        }
    }

    /// Human-readable violation messages, in rule order
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            write!(f, "valid")
        } else {
            write!(f, "{}", self.messages().join("; "))
        }
    }
}

/// Validates SQL text against the configured rule set.
///
/// Holds only configuration, so one instance can be shared by every request.
#[derive(Debug, Clone, Default)]
pub struct SafetyValidator {
    config: SafetyConfig,
}

impl SafetyValidator {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Validate a statement without executing it
    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        let mut violations = Vec::new();

        let parsed = Parser::parse_sql(&PostgreSqlDialect {}, sql);
        let root = match &parsed {
            Ok(statements) => match read_only_root(statements) {
                Ok(query) => Some(query),
                Err(violation) => {
                    violations.push(violation);
                    None
                }
            },
            Err(err) => {
                violations.push(Violation::Syntax(err.to_string()));
                None
            }
        };

        if let Some(query) = root {
            self.check_row_bound(query, &mut violations);
        }

        violations.extend(
            forbidden_keywords(sql)
                .into_iter()
                .map(|keyword| Violation::ForbiddenKeyword(keyword.to_string())),
        );

        if let Some(query) = root {
            self.check_relations(query, &mut violations);
        }

        let verdict = ValidationVerdict::from_violations(violations);
        if verdict.is_valid {
            tracing::info!(sql = %preview(sql), "SQL validation passed");
        } else {
            tracing::warn!(sql = %preview(sql), violations = %verdict, "SQL validation failed");
        }
        verdict
    }

    fn check_row_bound(&self, query: &Query, violations: &mut Vec<Violation>) {
        let Some(limit) = effective_limit(query) else {
            violations.push(Violation::MissingLimit);
            return;
        };

        match literal_number(limit) {
            Some(text) => match text.parse::<u64>() {
                Ok(value) if value <= self.config.max_limit => {}
                Ok(_) => violations.push(Violation::LimitExceeded {
                    limit: text.to_string(),
                    max: self.config.max_limit,
                }),
                // Digits only but too large for u64
                Err(_) if text.chars().all(|c| c.is_ascii_digit()) => {
                    violations.push(Violation::LimitExceeded {
                        limit: text.to_string(),
                        max: self.config.max_limit,
                    })
                }
                Err(_) => violations.push(Violation::InvalidLimit(text.to_string())),
            },
            None => violations.push(Violation::InvalidLimit(limit.to_string())),
        }
    }

    fn check_relations(&self, query: &Query, violations: &mut Vec<Violation>) {
        let mut scanner = RelationScanner::default();
        let _ = query.visit(&mut scanner);

        if scanner.joins > self.config.max_joins {
            violations.push(Violation::TooManyJoins {
                count: scanner.joins,
                max: self.config.max_joins,
            });
        }

        for table in &scanner.tables {
            let parts = table.0.iter().map(|ident| ident.value.as_str());
            if self.config.denied_prefix(parts).is_some() {
                violations.push(Violation::ForbiddenTable(table.to_string()));
            }
        }

        if scanner.derived_in_from {
            violations.push(Violation::SubqueryInFrom);
        }
    }
}

/// Returns the root query when the input is exactly one read-only SELECT
fn read_only_root(statements: &[Statement]) -> Result<&Query, Violation> {
    match statements {
        [] => Err(Violation::EmptyStatement),
        [Statement::Query(query)] => {
            ensure_select(query)?;
            Ok(query.as_ref())
        }
        [other] => Err(Violation::NotReadOnly(first_keyword(&other.to_string()))),
        many => Err(Violation::MultipleStatements(many.len())),
    }
}

fn ensure_select(query: &Query) -> Result<(), Violation> {
    if !query.locks.is_empty() {
        return Err(Violation::NotReadOnly("SELECT with locking clause".to_string()));
    }

    match query.body.as_ref() {
        SetExpr::Select(select) if select.into.is_some() => {
            Err(Violation::NotReadOnly("SELECT INTO".to_string()))
        }
        SetExpr::Select(_) => Ok(()),
        SetExpr::Query(inner) => ensure_select(inner),
        SetExpr::SetOperation { op, .. } => Err(Violation::NotReadOnly(op.to_string())),
        other => Err(Violation::NotReadOnly(first_keyword(&other.to_string()))),
    }
}

/// LIMIT of the query, looking through redundant parentheses around the body
fn effective_limit(query: &Query) -> Option<&Expr> {
    query.limit.as_ref().or_else(|| match query.body.as_ref() {
        SetExpr::Query(inner) => effective_limit(inner),
        _ => None,
    })
}

fn literal_number(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Value(Value::Number(text, _)) => Some(text.as_str()),
        Expr::Nested(inner) => literal_number(inner),
        _ => None,
    }
}

fn first_keyword(text: &str) -> String {
    text.split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

/// Collects join counts, table references and derived tables in one walk
#[derive(Default)]
struct RelationScanner {
    joins: usize,
    tables: Vec<ObjectName>,
    derived_in_from: bool,
}

impl Visitor for RelationScanner {
    type Break = ();

    // Every nested query is visited on its own, so only the joins that belong
    // directly to this query body are counted here.
    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.joins += joins_in_set_expr(&query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if !self.tables.contains(relation) {
            self.tables.push(relation.clone());
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        if matches!(table_factor, TableFactor::Derived { .. }) {
            self.derived_in_from = true;
        }
        ControlFlow::Continue(())
    }
}

fn joins_in_set_expr(body: &SetExpr) -> usize {
    match body {
        SetExpr::Select(select) => select.from.iter().map(joins_in_table_with_joins).sum(),
        SetExpr::SetOperation { left, right, .. } => {
            joins_in_set_expr(left) + joins_in_set_expr(right)
        }
        _ => 0,
    }
}

fn joins_in_table_with_joins(table: &TableWithJoins) -> usize {
    table.joins.len()
        + joins_in_factor(&table.relation)
        + table
            .joins
            .iter()
            .map(|join| joins_in_factor(&join.relation))
            .sum::<usize>()
}

fn joins_in_factor(factor: &TableFactor) -> usize {
    match factor {
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => joins_in_table_with_joins(table_with_joins),
        _ => 0,
    }
}
