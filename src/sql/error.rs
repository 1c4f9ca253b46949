//! Errors raised while lowering SQL text into the query AST.

use sqlparser::parser::ParserError;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Rejected by the tokenizer or the sqlparser grammar.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Anything but a SELECT query.
    #[error("only SELECT queries can be planned, got {0}")]
    UnsupportedStatement(String),

    #[error("expression not supported in a query: {0}")]
    UnsupportedExpression(String),

    #[error("clause not supported in a query: {0}")]
    UnsupportedClause(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("no statement in sql text")]
    EmptyQuery,

    #[error("expected exactly one statement")]
    MultipleStatements,
}

impl From<ParserError> for ParseError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::TokenizerError(msg) | ParserError::ParserError(msg) => {
                ParseError::Syntax(msg)
            }
            ParserError::RecursionLimitExceeded => {
                ParseError::Syntax("query nesting too deep".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parser_error() {
        let err: ParseError = ParserError::ParserError("Expected: end of statement".into()).into();
        assert_eq!(err, ParseError::Syntax("Expected: end of statement".into()));
        assert_eq!(
            err.to_string(),
            "syntax error: Expected: end of statement"
        );
        let err: ParseError = ParserError::RecursionLimitExceeded.into();
        assert!(matches!(err, ParseError::Syntax(_)));
    }
}
