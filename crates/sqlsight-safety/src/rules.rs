//! Rule set and violation types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Keywords that must never appear in a statement, in reporting order
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DELETE", "DROP", "TRUNCATE", "INSERT", "UPDATE", "CREATE", "ALTER", "GRANT", "REVOKE",
    "EXECUTE", "EXEC", "CALL", "MERGE", "COPY", "ATTACH", "DETACH", "PRAGMA", "INSTALL", "LOAD",
    "VACUUM",
];

/// A single named rule failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("sql syntax error: {0}")]
    Syntax(String),

    #[error("no sql statement provided")]
    EmptyStatement,

    #[error("expected exactly one statement, found {0}")]
    MultipleStatements(usize),

    #[error("write/ddl statement not allowed: {0}")]
    NotReadOnly(String),

    #[error("missing limit: query must include a LIMIT clause")]
    MissingLimit,

    #[error("limit {limit} exceeds maximum of {max}")]
    LimitExceeded { limit: String, max: u64 },

    #[error("limit must be a non-negative integer literal, found {0}")]
    InvalidLimit(String),

    #[error("forbidden keyword detected: {0}")]
    ForbiddenKeyword(String),

    #[error("too many joins: {count} (max: {max})")]
    TooManyJoins { count: usize, max: usize },

    #[error("access to system table forbidden: {0}")]
    ForbiddenTable(String),

    #[error("subqueries in FROM clause are not allowed")]
    SubqueryInFrom,
}

/// Tunable bounds for the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Largest LIMIT literal accepted
    pub max_limit: u64,

    /// Largest number of joins accepted across the whole statement
    pub max_joins: usize,

    /// Table name prefixes that identify system catalogs
    pub forbidden_table_prefixes: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_limit: 10_000,
            max_joins: 3,
            forbidden_table_prefixes: ["pg_", "information_schema", "pg_catalog", "duckdb_", "sqlite_"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SafetyConfig {
    /// Returns the first deny prefix matching any part of a qualified table name
    pub fn denied_prefix<'a, I>(&self, name_parts: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let parts: Vec<String> = name_parts.into_iter().map(str::to_ascii_lowercase).collect();
        self.forbidden_table_prefixes.iter().map(String::as_str).find(|prefix| {
            let prefix = prefix.to_ascii_lowercase();
            parts.iter().any(|part| part.starts_with(&prefix))
        })
    }
}

/// Case-insensitive whole-word scan of raw SQL text.
///
/// Every distinct forbidden keyword is reported once, in `FORBIDDEN_KEYWORDS`
/// order. String literals and comments are scanned too.
pub fn forbidden_keywords(sql: &str) -> Vec<&'static str> {
    let words: HashSet<String> = sql
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();

    FORBIDDEN_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| words.contains(*keyword))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_scan_is_case_insensitive() {
        assert_eq!(forbidden_keywords("select 1; drop table t"), vec!["DROP"]);
        assert_eq!(forbidden_keywords("DeLeTe FROM t"), vec!["DELETE"]);
    }

    #[test]
    fn test_keyword_scan_matches_whole_words_only() {
        assert!(forbidden_keywords("SELECT updated_at, created_at FROM orders LIMIT 5").is_empty());
        assert!(forbidden_keywords("SELECT dropout_rate FROM students LIMIT 5").is_empty());
    }

    #[test]
    fn test_keyword_scan_reports_in_list_order() {
        let found = forbidden_keywords("UPDATE t SET a = 1; DROP TABLE t; DELETE FROM u");
        assert_eq!(found, vec!["DELETE", "DROP", "UPDATE"]);
    }

    #[test]
    fn test_keyword_scan_sees_string_literals() {
        let found = forbidden_keywords("SELECT * FROM notes WHERE body = 'please drop it' LIMIT 1");
        assert_eq!(found, vec!["DROP"]);
    }

    #[test]
    fn test_default_config() {
        let config = SafetyConfig::default();
        assert_eq!(config.max_limit, 10_000);
        assert_eq!(config.max_joins, 3);
        assert!(config.forbidden_table_prefixes.contains(&"pg_".to_string()));
    }

    #[test]
    fn test_denied_prefix_checks_every_name_part() {
        let config = SafetyConfig::default();
        assert_eq!(config.denied_prefix(["information_schema", "tables"]), Some("information_schema"));
        assert_eq!(config.denied_prefix(["PG_CATALOG", "pg_class"]), Some("pg_"));
        assert_eq!(config.denied_prefix(["public", "orders"]), None);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: SafetyConfig = serde_yaml::from_str("max_joins: 5").unwrap();
        assert_eq!(config.max_joins, 5);
        assert_eq!(config.max_limit, 10_000);
    }

    #[test]
    fn test_violation_messages() {
        assert_eq!(
            Violation::TooManyJoins { count: 4, max: 3 }.to_string(),
            "too many joins: 4 (max: 3)"
        );
        assert_eq!(
            Violation::ForbiddenTable("pg_stat_activity".into()).to_string(),
            "access to system table forbidden: pg_stat_activity"
        );
    }
}
