//! Push a LIMIT count into the projection below it.

use super::PhysicalPass;
use crate::physical::{NodeId, PhysicalOp, PhysicalPlanArena};
use crate::planner::PlanResult;

/// Lets a projection stop after `limit` rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitOptimized;

impl PhysicalPass for LimitOptimized {
    fn name(&self) -> &str {
        "LimitOptimized"
    }

    fn transform(&self, arena: &mut PhysicalPlanArena, node: NodeId) -> PlanResult<Option<NodeId>> {
        let PhysicalOp::Limit {
            limit,
            optimized: false,
        } = *arena.op(node)
        else {
            return Ok(None);
        };
        let Some(input) = arena.node(node).producer(0) else {
            return Ok(None);
        };
        let PhysicalOp::Project {
            kind,
            limit: current,
        } = arena.op(input).clone()
        else {
            return Ok(None);
        };

        let project = match current {
            Some(existing) if existing <= limit => input,
            _ => arena.with_op(
                input,
                PhysicalOp::Project {
                    kind,
                    limit: Some(limit),
                },
            )?,
        };
        arena
            .create(
                PhysicalOp::Limit {
                    limit,
                    optimized: true,
                },
                vec![project],
            )
            .map(Some)
    }
}
