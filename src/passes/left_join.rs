//! Push grouping and sorting below a left join.
//!
//! A left join keeps every left row exactly once per match, so grouping or
//! sorting on left columns can happen before the join. Doing it there lets
//! the index pass see the left table scan directly.

use super::PhysicalPass;
use crate::physical::{NodeId, PhysicalOp, PhysicalPlanArena};
use crate::planner::{JoinType, PlanResult};
use crate::sql::Expr;

/// Moves group / sort operators from above a LEFT join onto its left input.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeftJoinOptimized;

impl LeftJoinOptimized {
    fn keys(op: &PhysicalOp) -> Option<Vec<Expr>> {
        match op {
            PhysicalOp::GroupBy { .. }
            | PhysicalOp::SortBy { .. }
            | PhysicalOp::GroupAndSort { .. } => Some(op.key_exprs()),
            _ => None,
        }
    }
}

impl PhysicalPass for LeftJoinOptimized {
    fn name(&self) -> &str {
        "LeftJoinOptimized"
    }

    fn transform(&self, arena: &mut PhysicalPlanArena, node: NodeId) -> PlanResult<Option<NodeId>> {
        let op = arena.op(node).clone();
        let Some(keys) = Self::keys(&op) else {
            return Ok(None);
        };
        let Some(join) = arena.node(node).producer(0) else {
            return Ok(None);
        };
        let join_op = arena.op(join).clone();
        if !matches!(
            join_op,
            PhysicalOp::Join {
                join_type: JoinType::Left,
                ..
            }
        ) {
            return Ok(None);
        }

        let (left, right) = {
            let producers = arena.node(join).producers();
            (producers[0], producers[1])
        };
        let left_schema = arena.node(left).schema();
        let resolvable = !keys.is_empty()
            && keys.iter().all(|k| {
                k.as_column()
                    .is_some_and(|col| left_schema.resolve(col).is_some())
            });
        if !resolvable {
            return Ok(None);
        }

        let pushed = arena.create(op, vec![left])?;
        arena.create(join_op, vec![pushed, right]).map(Some)
    }
}
