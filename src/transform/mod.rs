//! Logical to physical plan transformation.

mod memo;
mod project;
mod transformer;

pub use memo::LogicalOpKey;
pub use transformer::PlanTransformer;
