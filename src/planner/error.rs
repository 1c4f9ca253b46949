//! Planning errors.

use std::fmt;

use thiserror::Error;

use crate::catalog::SchemaError;
use crate::codegen::CodegenError;
use crate::config::ConfigError;
use crate::sql::ParseError;

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Coarse classification of a planning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The caller handed in something unusable.
    Input,
    /// The plan shape is unsupported or inconsistent.
    Plan,
    /// A table or index could not be resolved.
    Catalog,
    /// The expression compiler rejected an expression.
    Codegen,
    /// The SQL text could not be parsed.
    Parse,
    /// The transformer configuration is invalid.
    Config,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Input => "kPlanError.Input",
            ErrorCode::Plan => "kPlanError",
            ErrorCode::Catalog => "kPlanError.Catalog",
            ErrorCode::Codegen => "kCodegenError",
            ErrorCode::Parse => "kSqlError",
            ErrorCode::Config => "kConfigError",
        };
        write!(f, "{}", name)
    }
}

/// Query planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("fail to transform physical plan: {0}")]
    Plan(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("table {db}.{table} not exist")]
    TableNotFound { db: String, table: String },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("undefined window: {0}")]
    UndefinedWindow(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("fail to codegen: {0}")]
    Codegen(#[from] CodegenError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl PlanError {
    /// Classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PlanError::Input(_) => ErrorCode::Input,
            PlanError::Plan(_)
            | PlanError::Unsupported(_)
            | PlanError::ColumnNotFound(_)
            | PlanError::UndefinedWindow(_) => ErrorCode::Plan,
            PlanError::TableNotFound { .. } | PlanError::Schema(_) => ErrorCode::Catalog,
            PlanError::Codegen(_) => ErrorCode::Codegen,
            PlanError::Parse(_) => ErrorCode::Parse,
            PlanError::Config(_) => ErrorCode::Config,
        }
    }
}
