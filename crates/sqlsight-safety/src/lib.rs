//! SQL safety gate for model-generated queries
//!
//! Certifies that a single SQL statement is safe to hand to a live database
//! connection. Two passes run over every statement:
//! - an AST pass (via `sqlparser`) for statement kind, row bound, join count,
//!   system-table access and derived tables in FROM
//! - a raw-text pass that scans for forbidden keywords
//!
//! Both passes always contribute to the same verdict. The raw scan runs even
//! when the statement does not parse, so a dialect quirk in the parser cannot
//! hide a write keyword.

mod rules;
mod validator;

pub use rules::{forbidden_keywords, SafetyConfig, Violation, FORBIDDEN_KEYWORDS};
pub use validator::{SafetyValidator, ValidationVerdict};
