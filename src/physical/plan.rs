//! Compiled physical plans and their explain output.

use std::fmt;

use super::arena::{NodeId, PhysicalPlanArena};
use super::op::{PhysicalOp, ProjectKind, ProviderKind};
use crate::planner::{FrameBound, FrameUnits, OrderBy, WindowFrame};
use crate::sql::Expr;

/// A compiled plan: the arena holding every node and the root handle.
#[derive(Debug)]
pub struct PhysicalPlan {
    pub arena: PhysicalPlanArena,
    pub root: NodeId,
}

impl PhysicalPlan {
    pub fn new(arena: PhysicalPlanArena, root: NodeId) -> Self {
        Self { arena, root }
    }

    /// Explain text of the subtree rooted at `id`.
    pub fn explain_node(&self, id: NodeId) -> String {
        let mut lines = Vec::new();
        self.collect_lines(id, 0, &mut lines);
        lines.join("\n")
    }

    fn collect_lines(&self, id: NodeId, depth: usize, lines: &mut Vec<String>) {
        lines.push(format!("{}{}", "  ".repeat(depth), self.describe(id)));
        for &producer in self.arena.node(id).producers() {
            self.collect_lines(producer, depth + 1, lines);
        }
    }

    /// One-line description of a node.
    fn describe(&self, id: NodeId) -> String {
        let node = self.arena.node(id);
        match node.op() {
            PhysicalOp::DataProvider { kind, table } => match kind {
                ProviderKind::Table => format!("DATA_PROVIDER(table={})", table.name),
                ProviderKind::Request => {
                    format!("DATA_PROVIDER(type=Request, table={})", table.name)
                }
                ProviderKind::Partition { index } => format!(
                    "DATA_PROVIDER(type=Partition, table={}, index={})",
                    table.name, index
                ),
            },
            PhysicalOp::GroupBy { groups } => {
                format!("GROUP_BY(group_keys={})", fmt_keys(groups))
            }
            PhysicalOp::SortBy { order } => format!("SORT_BY(orders={})", order),
            PhysicalOp::GroupAndSort { groups, order } => format!(
                "GROUP_AND_SORT_BY(group_keys={}, orders={})",
                fmt_keys(groups),
                fmt_order(order.as_ref())
            ),
            PhysicalOp::Filter { condition } => format!("FILTER(condition={})", condition),
            PhysicalOp::Join {
                join_type,
                condition,
                order,
            } => {
                let mut out = format!("JOIN(type={}", join_type.name());
                if let Some(order) = order {
                    out.push_str(&format!(", right_sort={}", order));
                }
                if let Some(condition) = condition {
                    out.push_str(&format!(", condition={}", condition));
                }
                out.push(')');
                out
            }
            PhysicalOp::Union { all } => format!("UNION(all={})", all),
            PhysicalOp::RequestUnion { groups, order } => format!(
                "REQUEST_UNION(partition_keys={}, orders={})",
                fmt_keys(groups),
                fmt_order(order.as_ref())
            ),
            PhysicalOp::Project { kind, limit } => {
                let mut out = format!("PROJECT(type={}", kind.name());
                match kind {
                    ProjectKind::GroupAggregation { groups } => {
                        out.push_str(&format!(", group_keys={}", fmt_keys(groups)));
                    }
                    ProjectKind::WindowAggregation {
                        partition_by,
                        order,
                        frame,
                    } => {
                        out.push_str(&format!(
                            ", partition_keys={}, orders={}",
                            fmt_keys(partition_by),
                            fmt_order(order.as_ref())
                        ));
                        if let Some(frame) = frame {
                            out.push_str(&format!(", {}", fmt_frame(frame, order.as_ref())));
                        }
                    }
                    _ => {}
                }
                if let Some(limit) = limit {
                    out.push_str(&format!(", limit={}", limit));
                }
                out.push(')');
                out
            }
            PhysicalOp::SimpleProject { sources } => {
                let input = node
                    .producer(0)
                    .map(|p| self.arena.node(p).schema());
                let parts: Vec<String> = sources
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let (part, offset) = input
                            .and_then(|schema| schema.locate(s.position))
                            .unwrap_or((0, s.position));
                        format!("[{}]<-[{}:{}]", i, part, offset)
                    })
                    .collect();
                format!("SIMPLE_PROJECT(sources=({}))", parts.join(", "))
            }
            PhysicalOp::Distinct => "DISTINCT".to_string(),
            PhysicalOp::Rename { alias } => format!("RENAME(name={})", alias),
            PhysicalOp::Limit { limit, optimized } => {
                if *optimized {
                    format!("LIMIT(limit={}, optimized)", limit)
                } else {
                    format!("LIMIT(limit={})", limit)
                }
            }
        }
    }
}

fn fmt_keys(keys: &[Expr]) -> String {
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    format!("({})", keys.join(","))
}

fn fmt_order(order: Option<&OrderBy>) -> String {
    match order {
        Some(order) => order.to_string(),
        None => "() ASC".to_string(),
    }
}

/// `range=(col5, -3, 0)`: the ordering column and both frame offsets.
fn fmt_frame(frame: &WindowFrame, order: Option<&OrderBy>) -> String {
    let units = match frame.units {
        FrameUnits::Rows => "rows",
        FrameUnits::Range => "range",
    };
    let bound = |b: FrameBound| match b.offset() {
        Some(offset) => offset.to_string(),
        None => "UNBOUNDED".to_string(),
    };
    let key = order
        .and_then(|o| o.exprs.first())
        .map(|e| e.to_string())
        .unwrap_or_default();
    format!(
        "{}=({}, {}, {})",
        units,
        key,
        bound(frame.start),
        bound(frame.end)
    )
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explain_node(self.root))
    }
}
