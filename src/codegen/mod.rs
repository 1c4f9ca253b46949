//! Expression compiler binding.
//!
//! The transformer never evaluates expressions itself. It hands each list of
//! expressions to an [`ExprCompiler`] together with the schema they read
//! from, and stores the returned [`FnInfo`] on the physical node.

mod error;
mod infer;

pub use error::{CodegenError, CodegenResult};
pub use infer::SchemaInferCompiler;

use crate::physical::Schema;
use crate::planner::FnDef;
use crate::sql::Expr;

/// A compiled computation unit: its symbol name and output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnInfo {
    pub fn_name: String,
    pub fn_schema: Schema,
}

/// Compiles expression lists into named functions.
///
/// A compiler belongs to one transformer, which may be moved to another
/// thread, hence the `Send` bound.
pub trait ExprCompiler: Send {
    /// Compile `exprs` (output name, expression) against `input`.
    ///
    /// `row_mode` is true when the function runs once per input row;
    /// aggregate calls are only valid when it is false.
    fn compile(
        &mut self,
        input: &Schema,
        exprs: &[(String, Expr)],
        row_mode: bool,
    ) -> CodegenResult<FnInfo>;

    /// Register a user defined function.
    fn define_function(&mut self, def: &FnDef) -> CodegenResult<()>;
}
