//! SQL front-end.
//!
//! SELECT text is parsed with `sqlparser` and lowered into a small owned AST
//! that keeps only what the query planner understands: projections with
//! window calls, named windows and frames, joins, derived tables, grouping,
//! ordering and limits.

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::Parser;
