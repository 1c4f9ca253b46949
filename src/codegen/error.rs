//! Expression compilation errors.

use thiserror::Error;

/// Result type for expression compilation.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Expression compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("column {0} not found")]
    UnknownColumn(String),

    #[error("function {0} not found")]
    UnknownFunction(String),

    #[error("function {0} already defined")]
    DuplicateFunction(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("aggregate function {0} can't be used in row mode")]
    AggregateInRowMode(String),

    #[error("no expression to compile")]
    EmptyExprList,
}
