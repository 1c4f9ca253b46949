//! Logical query planning.
//!
//! This module turns parsed SELECT statements into logical plan trees and
//! defines the error type shared by every planning stage.

mod error;
mod logical;
mod planner;

pub use error::{ErrorCode, PlanError, PlanResult};
pub use logical::{
    ColumnRef, Expr, FnDef, FrameBound, FrameUnits, JoinType, LogicalPlan, OrderBy, ProjectItem,
    ProjectList, WindowDef, WindowFrame,
};
pub use planner::QueryPlanner;
