//! Transformer configuration.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the primary table is served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Whole tables are scanned.
    #[default]
    Batch,
    /// One request row is served against the stored history.
    Request,
}

/// Rewrite passes that can be registered on a transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    LeftJoinOptimized,
    GroupAndSortOptimized,
    LimitOptimized,
}

/// Options of a [`PlanTransformer`](crate::transform::PlanTransformer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Database unqualified tables are resolved in.
    pub db: String,
    pub mode: TransformMode,
    /// Passes run after compilation, in order.
    pub passes: Vec<PassKind>,
    /// Largest group key set the index search explores.
    pub max_index_search_columns: usize,
    /// Compile column-only projections to simple projects.
    pub simple_project: bool,
}

/// Upper bound for `max_index_search_columns`. The index search may visit
/// every subset of the candidate columns.
pub const MAX_INDEX_SEARCH_COLUMNS: usize = 20;

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            db: "db".to_string(),
            mode: TransformMode::Batch,
            passes: vec![PassKind::LeftJoinOptimized, PassKind::GroupAndSortOptimized],
            max_index_search_columns: 16,
            simple_project: true,
        }
    }
}

impl TransformConfig {
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_passes(mut self, passes: Vec<PassKind>) -> Self {
        self.passes = passes;
        self
    }

    pub fn is_request_mode(&self) -> bool {
        self.mode == TransformMode::Request
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: TransformConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.db.is_empty() {
            return Err(ConfigError::Invalid("db must not be empty".into()));
        }
        if self.max_index_search_columns == 0
            || self.max_index_search_columns > MAX_INDEX_SEARCH_COLUMNS
        {
            return Err(ConfigError::Invalid(format!(
                "max_index_search_columns must be in 1..={}, got {}",
                MAX_INDEX_SEARCH_COLUMNS, self.max_index_search_columns
            )));
        }
        Ok(())
    }
}
