//! Index selection for grouping and sorting.
//!
//! A group, group-and-sort or request union reading from a full table scan
//! can read from an index partition instead when some of its group keys are
//! exactly the key set of an index. The matched keys are then implied by the
//! partitioning and drop out of the operator, and an order on the index's
//! time column is implied as well.

use std::collections::HashSet;

use tracing::trace;

use super::PhysicalPass;
use crate::catalog::{IndexDef, TableDef, TableHandle};
use crate::config::MAX_INDEX_SEARCH_COLUMNS;
use crate::physical::{NodeId, PhysicalOp, PhysicalPlanArena, ProviderKind};
use crate::planner::{OrderBy, PlanResult};
use crate::sql::Expr;

/// Replaces full table scans with index partition scans.
#[derive(Debug, Clone)]
pub struct GroupAndSortOptimized {
    max_search_columns: usize,
}

/// A full table scan and the renames / simple projects stacked on it.
struct SourceChain {
    /// Wrapper nodes, outermost first.
    wrappers: Vec<NodeId>,
    top: NodeId,
    table: TableHandle,
}

/// Outcome of a successful index match.
struct Optimized {
    source: NodeId,
    groups: Vec<Expr>,
    order: Option<OrderBy>,
}

impl GroupAndSortOptimized {
    pub fn new(max_search_columns: usize) -> Self {
        Self {
            max_search_columns: max_search_columns.clamp(1, MAX_INDEX_SEARCH_COLUMNS),
        }
    }

    fn find_source(arena: &PhysicalPlanArena, top: NodeId) -> Option<SourceChain> {
        let mut wrappers = Vec::new();
        let mut id = top;
        loop {
            match arena.op(id) {
                PhysicalOp::DataProvider {
                    kind: ProviderKind::Table,
                    table,
                } => {
                    return Some(SourceChain {
                        wrappers,
                        top,
                        table: table.clone(),
                    })
                }
                PhysicalOp::SimpleProject { .. } | PhysicalOp::Rename { .. } => {
                    wrappers.push(id);
                    id = arena.node(id).producer(0)?;
                }
                _ => return None,
            }
        }
    }

    /// Table column a key refers to, looking through the wrappers.
    fn table_column(arena: &PhysicalPlanArena, chain: &SourceChain, expr: &Expr) -> Option<String> {
        let col = expr.as_column()?;
        let mut pos = arena.node(chain.top).schema().resolve(col)?;
        for &wrapper in &chain.wrappers {
            if let PhysicalOp::SimpleProject { sources } = arena.op(wrapper) {
                pos = sources.get(pos)?.position;
            }
        }
        chain.table.columns.get(pos).map(|c| c.name.clone())
    }

    /// Index whose key set is the largest subset of `columns`.
    fn best_index<'t>(&self, table: &'t TableDef, columns: &[String]) -> Option<&'t IndexDef> {
        // columns outside every index key set can never be part of a match
        let indexed: HashSet<&str> = table
            .indexes
            .values()
            .flat_map(|index| index.keys.iter().map(String::as_str))
            .collect();
        let mut seen = HashSet::new();
        let mut columns: Vec<String> = columns
            .iter()
            .filter(|c| indexed.contains(c.as_str()) && seen.insert(c.as_str()))
            .cloned()
            .collect();
        if columns.len() > self.max_search_columns {
            trace!(
                columns = columns.len(),
                cap = self.max_search_columns,
                "truncating index search"
            );
        }
        columns.truncate(self.max_search_columns);
        if columns.is_empty() {
            return None;
        }
        let full = (1u64 << columns.len()) - 1;

        let mut visited = HashSet::new();
        let mut best = None;
        Self::search(table, &columns, full, &mut visited, &mut best);
        best.map(|(_, index)| index)
    }

    fn search<'t>(
        table: &'t TableDef,
        columns: &[String],
        mask: u64,
        visited: &mut HashSet<u64>,
        best: &mut Option<(u32, &'t IndexDef)>,
    ) {
        if mask == 0 || !visited.insert(mask) {
            return;
        }
        let size = mask.count_ones();
        if matches!(*best, Some((n, _)) if n > size) {
            return;
        }

        let subset: HashSet<&str> = (0..columns.len())
            .filter(|&i| mask & (1u64 << i) != 0)
            .map(|i| columns[i].as_str())
            .collect();
        // indexes iterate in name order, so the first hit has the smallest name
        let hit = table.indexes.values().find(|index| {
            index.keys.len() == subset.len()
                && index.keys.iter().all(|k| subset.contains(k.as_str()))
        });
        if let Some(index) = hit {
            trace!(index = %index.name, size, "index matches group keys");
            let better = match *best {
                None => true,
                Some((n, current)) => size > n || (size == n && index.name < current.name),
            };
            if better {
                *best = Some((size, index));
            }
            return;
        }

        for i in 0..columns.len() {
            if mask & (1u64 << i) != 0 {
                Self::search(table, columns, mask & !(1u64 << i), visited, best);
            }
        }
    }

    fn optimize(
        &self,
        arena: &mut PhysicalPlanArena,
        input: NodeId,
        groups: &[Expr],
        order: Option<&OrderBy>,
    ) -> PlanResult<Option<Optimized>> {
        let Some(chain) = Self::find_source(arena, input) else {
            return Ok(None);
        };

        let key_columns: Vec<Option<String>> = groups
            .iter()
            .map(|g| Self::table_column(arena, &chain, g))
            .collect();
        let mut candidates: Vec<String> = Vec::new();
        for column in key_columns.iter().flatten() {
            if !candidates.contains(column) {
                candidates.push(column.clone());
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let Some(index) = self.best_index(&chain.table, &candidates).cloned() else {
            trace!(table = %chain.table.name, "no index matches group keys");
            return Ok(None);
        };

        let residual: Vec<Expr> = groups
            .iter()
            .zip(&key_columns)
            .filter(|(_, column)| !matches!(column, Some(name) if index.keys.contains(name)))
            .map(|(g, _)| g.clone())
            .collect();

        let order = order
            .filter(|o| {
                let on_ts = match o.exprs.as_slice() {
                    [only] => {
                        index.ts.is_some() && Self::table_column(arena, &chain, only) == index.ts
                    }
                    _ => false,
                };
                !on_ts
            })
            .cloned();

        let mut source = arena.create(
            PhysicalOp::DataProvider {
                kind: ProviderKind::Partition {
                    index: index.name.clone(),
                },
                table: chain.table.clone(),
            },
            vec![],
        )?;
        for &wrapper in chain.wrappers.iter().rev() {
            source = arena.with_producers(wrapper, vec![source])?;
        }

        Ok(Some(Optimized {
            source,
            groups: residual,
            order,
        }))
    }

    /// The cheapest operator still needed over an index partition.
    fn regroup(arena: &mut PhysicalPlanArena, optimized: Optimized) -> PlanResult<NodeId> {
        let Optimized {
            source,
            groups,
            order,
        } = optimized;
        match (groups.is_empty(), order) {
            (true, None) => Ok(source),
            (true, Some(order)) => arena.create(PhysicalOp::SortBy { order }, vec![source]),
            (false, None) => arena.create(PhysicalOp::GroupBy { groups }, vec![source]),
            (false, Some(order)) => arena.create(
                PhysicalOp::GroupAndSort {
                    groups,
                    order: Some(order),
                },
                vec![source],
            ),
        }
    }
}

impl PhysicalPass for GroupAndSortOptimized {
    fn name(&self) -> &str {
        "GroupAndSortOptimized"
    }

    fn transform(&self, arena: &mut PhysicalPlanArena, node: NodeId) -> PlanResult<Option<NodeId>> {
        let producers = arena.node(node).producers().to_vec();
        match arena.op(node).clone() {
            PhysicalOp::GroupBy { groups } => {
                match self.optimize(arena, producers[0], &groups, None)? {
                    Some(optimized) => Self::regroup(arena, optimized).map(Some),
                    None => Ok(None),
                }
            }
            PhysicalOp::GroupAndSort { groups, order } => {
                match self.optimize(arena, producers[0], &groups, order.as_ref())? {
                    Some(optimized) => Self::regroup(arena, optimized).map(Some),
                    None => Ok(None),
                }
            }
            PhysicalOp::RequestUnion { groups, order } => {
                match self.optimize(arena, producers[1], &groups, order.as_ref())? {
                    Some(optimized) => arena
                        .create(
                            PhysicalOp::RequestUnion {
                                groups: optimized.groups,
                                order: optimized.order,
                            },
                            vec![producers[0], optimized.source],
                        )
                        .map(Some),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::DataType;
    use crate::catalog::TableBuilder;
    use crate::physical::{ColumnSource, PhysicalPlan};

    fn t1() -> TableHandle {
        Arc::new(
            TableBuilder::new("db", "t1")
                .add_column("col0", DataType::String)
                .add_column("col1", DataType::Int32)
                .add_column("col2", DataType::Int16)
                .add_column("col3", DataType::Float)
                .add_column("col5", DataType::Int64)
                .add_index("index12", &["col1", "col2"], Some("col5"))
                .add_index("index1", &["col1"], Some("col5"))
                .build()
                .unwrap(),
        )
    }

    fn scan(arena: &mut PhysicalPlanArena, table: TableHandle) -> NodeId {
        arena
            .create(
                PhysicalOp::DataProvider {
                    kind: ProviderKind::Table,
                    table,
                },
                vec![],
            )
            .unwrap()
    }

    fn cols(names: &[&str]) -> Vec<Expr> {
        names.iter().map(|n| Expr::column(*n)).collect()
    }

    fn run(arena: PhysicalPlanArena, node: NodeId) -> String {
        let mut arena = arena;
        let pass = GroupAndSortOptimized::new(16);
        let root = pass.transform(&mut arena, node).unwrap().unwrap();
        PhysicalPlan::new(arena, root).to_string()
    }

    #[test]
    fn test_exact_match_removes_group() {
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let group = arena
            .create(PhysicalOp::GroupBy { groups: cols(&["col1"]) }, vec![t])
            .unwrap();
        assert_eq!(
            run(arena, group),
            "DATA_PROVIDER(type=Partition, table=t1, index=index1)"
        );
    }

    #[test]
    fn test_superset_keeps_residual_in_order() {
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let group = arena
            .create(
                PhysicalOp::GroupBy {
                    groups: cols(&["col3", "col2", "col0", "col1"]),
                },
                vec![t],
            )
            .unwrap();
        assert_eq!(
            run(arena, group),
            "GROUP_BY(group_keys=(col3,col0))\n  DATA_PROVIDER(type=Partition, table=t1, index=index12)"
        );
    }

    #[test]
    fn test_ts_order_dropped() {
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let node = arena
            .create(
                PhysicalOp::GroupAndSort {
                    groups: cols(&["col1"]),
                    order: Some(OrderBy::asc(Expr::column("col5"))),
                },
                vec![t],
            )
            .unwrap();
        assert_eq!(
            run(arena, node),
            "DATA_PROVIDER(type=Partition, table=t1, index=index1)"
        );

        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let node = arena
            .create(
                PhysicalOp::GroupAndSort {
                    groups: cols(&["col1"]),
                    order: Some(OrderBy::asc(Expr::column("col3"))),
                },
                vec![t],
            )
            .unwrap();
        assert_eq!(
            run(arena, node),
            "SORT_BY(orders=(col3) ASC)\n  DATA_PROVIDER(type=Partition, table=t1, index=index1)"
        );
    }

    #[test]
    fn test_tie_breaks_on_index_name() {
        let table = Arc::new(
            TableBuilder::new("db", "t3")
                .add_column("col1", DataType::Int32)
                .add_column("col2", DataType::Int32)
                .add_index("index_b", &["col1"], None)
                .add_index("index_a", &["col2"], None)
                .build()
                .unwrap(),
        );
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, table);
        let group = arena
            .create(PhysicalOp::GroupBy { groups: cols(&["col1", "col2"]) }, vec![t])
            .unwrap();
        assert_eq!(
            run(arena, group),
            "GROUP_BY(group_keys=(col1))\n  DATA_PROVIDER(type=Partition, table=t3, index=index_a)"
        );
    }

    #[test]
    fn test_no_match_is_untouched() {
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let group = arena
            .create(PhysicalOp::GroupBy { groups: cols(&["col2", "col3"]) }, vec![t])
            .unwrap();
        let before = arena.len();
        let pass = GroupAndSortOptimized::new(16);
        assert!(pass.transform(&mut arena, group).unwrap().is_none());
        assert_eq!(arena.len(), before);

        let expr_key = arena
            .create(
                PhysicalOp::GroupBy {
                    groups: vec![Expr::call("abs", vec![Expr::column("col1")])],
                },
                vec![t],
            )
            .unwrap();
        assert!(pass.transform(&mut arena, expr_key).unwrap().is_none());
    }

    #[test]
    fn test_search_cap() {
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let group = arena
            .create(PhysicalOp::GroupBy { groups: cols(&["col2", "col1"]) }, vec![t])
            .unwrap();
        let pass = GroupAndSortOptimized::new(1);
        assert!(pass.transform(&mut arena, group).unwrap().is_none());

        // unindexed keys do not count against the cap
        let group = arena
            .create(
                PhysicalOp::GroupBy {
                    groups: cols(&["col3", "col0", "col1"]),
                },
                vec![t],
            )
            .unwrap();
        let root = pass.transform(&mut arena, group).unwrap().unwrap();
        assert!(matches!(
            arena.op(root),
            PhysicalOp::GroupBy { groups } if *groups == cols(&["col3", "col0"])
        ));
    }

    #[test]
    fn test_looks_through_rename_and_simple_project() {
        let mut arena = PhysicalPlanArena::new();
        let t = scan(&mut arena, t1());
        let simple = arena
            .create(
                PhysicalOp::SimpleProject {
                    sources: vec![
                        ColumnSource { position: 1, name: "c1".into() },
                        ColumnSource { position: 2, name: "c2".into() },
                    ],
                },
                vec![t],
            )
            .unwrap();
        let renamed = arena
            .create(PhysicalOp::Rename { alias: "s".into() }, vec![simple])
            .unwrap();
        let group = arena
            .create(
                PhysicalOp::GroupBy {
                    groups: vec![Expr::qualified("s", "c2"), Expr::qualified("s", "c1")],
                },
                vec![renamed],
            )
            .unwrap();
        assert_eq!(
            run(arena, group),
            "RENAME(name=s)\n  SIMPLE_PROJECT(sources=([0]<-[0:1], [1]<-[0:2]))\n    DATA_PROVIDER(type=Partition, table=t1, index=index12)"
        );
    }
}
