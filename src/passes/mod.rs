//! Rewrite passes over physical plans.
//!
//! A pass only describes a local rewrite of one node. [`apply_pass`] walks the
//! plan bottom-up, relinks every node whose producers changed and then offers
//! the node to the pass. Nodes are never mutated; rewritten nodes are copies.

mod group_sort;
mod left_join;
mod limit;

use std::collections::HashMap;

use tracing::debug;

pub use group_sort::GroupAndSortOptimized;
pub use left_join::LeftJoinOptimized;
pub use limit::LimitOptimized;

use crate::config::{PassKind, TransformConfig};
use crate::physical::{NodeId, PhysicalPlanArena};
use crate::planner::PlanResult;

/// A local rewrite of a physical node.
pub trait PhysicalPass: Send {
    fn name(&self) -> &str;

    /// Replacement for `node`, or `None` when the pattern does not apply.
    fn transform(&self, arena: &mut PhysicalPlanArena, node: NodeId) -> PlanResult<Option<NodeId>>;
}

/// Build the pass registered under `kind`.
pub fn build_pass(kind: PassKind, config: &TransformConfig) -> Box<dyn PhysicalPass> {
    match kind {
        PassKind::LeftJoinOptimized => Box::new(LeftJoinOptimized),
        PassKind::GroupAndSortOptimized => {
            Box::new(GroupAndSortOptimized::new(config.max_index_search_columns))
        }
        PassKind::LimitOptimized => Box::new(LimitOptimized),
    }
}

/// Run `pass` over the plan rooted at `root`.
///
/// Returns the new root and whether anything changed. A node reachable
/// through several parents is rewritten once.
pub fn apply_pass(
    pass: &dyn PhysicalPass,
    arena: &mut PhysicalPlanArena,
    root: NodeId,
) -> PlanResult<(NodeId, bool)> {
    let before = arena.len();
    let mut memo = HashMap::new();
    let new_root = rewrite(pass, arena, root, &mut memo)?;
    let changed = new_root != root;
    debug!(
        pass = pass.name(),
        changed,
        new_nodes = arena.len() - before,
        "applied physical pass"
    );
    Ok((new_root, changed))
}

fn rewrite(
    pass: &dyn PhysicalPass,
    arena: &mut PhysicalPlanArena,
    id: NodeId,
    memo: &mut HashMap<NodeId, NodeId>,
) -> PlanResult<NodeId> {
    if let Some(&done) = memo.get(&id) {
        return Ok(done);
    }

    let producers = arena.node(id).producers().to_vec();
    let mut relinked = Vec::with_capacity(producers.len());
    for &producer in &producers {
        relinked.push(rewrite(pass, arena, producer, memo)?);
    }

    let mut current = if relinked != producers {
        arena.with_producers(id, relinked)?
    } else {
        id
    };
    if let Some(replacement) = pass.transform(arena, current)? {
        debug!(pass = pass.name(), from = %current, to = %replacement, "rewrote node");
        current = replacement;
    }

    memo.insert(id, current);
    Ok(current)
}
