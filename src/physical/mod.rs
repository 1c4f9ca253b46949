//! Physical operator model.
//!
//! A physical plan is a DAG of [`PhysicalNode`]s owned by a
//! [`PhysicalPlanArena`] and addressed through [`NodeId`] handles.

mod arena;
mod op;
mod plan;
mod schema;

pub use arena::{NodeId, PhysicalNode, PhysicalPlanArena};
pub use op::{ColumnSource, OutputType, PhysicalOp, ProjectKind, ProviderKind};
pub use plan::PhysicalPlan;
pub use schema::{Column, Schema};
