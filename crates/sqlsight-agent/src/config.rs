//! Configuration for the sqlsight agent
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (model, database, cache, safety bounds, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values. A missing
//! config file means defaults.

use serde::{Deserialize, Serialize};
use sqlsight_pipeline::prompts::DEFAULT_SCHEMA_CONTEXT;
use sqlsight_pipeline::{CacheConfig, ChartPlanMode, PipelineConfig};
use sqlsight_safety::SafetyConfig;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar { name: String, value: String },
}

/// Completion endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,

    /// OpenAI-compatible base URL, e.g. https://api.groq.com/openai/v1
    pub api_base: Option<String>,

    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB database file, opened read-only
    pub path: String,

    pub statement_timeout_ms: u64,

    /// Used when the database schema cannot be introspected
    pub schema_context: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "analytics.duckdb".to_string(),
            statement_timeout_ms: 30_000,
            schema_context: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    /// `rules` or `model`
    pub planner: ChartPlanMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: console, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            output: "console".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub safety: SafetyConfig,
    pub charts: ChartsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("SQLSIGHT_DB_PATH") {
            self.database.path = path;
        }
        if let Ok(timeout) = std::env::var("SQLSIGHT_STATEMENT_TIMEOUT_MS") {
            self.database.statement_timeout_ms = parse_env("SQLSIGHT_STATEMENT_TIMEOUT_MS", timeout)?;
        }

        if let Ok(model) = std::env::var("SQLSIGHT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(api_base) = std::env::var("SQLSIGHT_LLM_API_BASE") {
            self.llm.api_base = Some(api_base);
        }

        if let Ok(ttl) = std::env::var("SQLSIGHT_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_env("SQLSIGHT_CACHE_TTL_SECS", ttl)?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }

    /// Static schema context: the configured one, else the built-in sample schema
    pub fn fallback_schema_context(&self) -> String {
        self.database
            .schema_context
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA_CONTEXT.to_string())
    }

    pub fn pipeline_config(&self, schema_context: String) -> PipelineConfig {
        PipelineConfig {
            safety: self.safety.clone(),
            statement_timeout_ms: self.database.statement_timeout_ms,
            chart_planner: self.charts.planner,
            schema_context,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvVar {
        name: name.to_string(),
        value,
    })
}
