//! Physical operator kinds.

use crate::catalog::TableHandle;
use crate::planner::{JoinType, OrderBy, WindowFrame};
use crate::sql::Expr;

/// How a data source is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// Full table scan.
    Table,
    /// The single row being served in request mode.
    Request,
    /// Rows of one index, already grouped by its keys.
    Partition { index: String },
}

/// Shape of the rows a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Row,
    Table,
    Group,
}

/// Evaluation strategy of a project node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKind {
    /// One output row per input row, in request mode.
    RowProject,
    /// One output row per input row.
    TableProject,
    /// One output row for the whole input.
    Aggregation,
    /// One output row per group.
    GroupAggregation { groups: Vec<Expr> },
    /// One output row per input row, aggregated over its window.
    WindowAggregation {
        partition_by: Vec<Expr>,
        order: Option<OrderBy>,
        frame: Option<WindowFrame>,
    },
}

impl ProjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectKind::RowProject => "RowProject",
            ProjectKind::TableProject => "TableProject",
            ProjectKind::Aggregation => "Aggregation",
            ProjectKind::GroupAggregation { .. } => "GroupAggregation",
            ProjectKind::WindowAggregation { .. } => "WindowAggregation",
        }
    }

    /// Row-wise kinds compile their expressions one row at a time.
    pub fn is_row_mode(&self) -> bool {
        matches!(self, ProjectKind::RowProject | ProjectKind::TableProject)
    }
}

/// One output column of a simple project: a column of the input, by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSource {
    pub position: usize,
    pub name: String,
}

/// A physical operator.
#[derive(Debug, Clone)]
pub enum PhysicalOp {
    DataProvider {
        kind: ProviderKind,
        table: TableHandle,
    },
    GroupBy {
        groups: Vec<Expr>,
    },
    SortBy {
        order: OrderBy,
    },
    GroupAndSort {
        groups: Vec<Expr>,
        order: Option<OrderBy>,
    },
    Filter {
        condition: Expr,
    },
    Join {
        join_type: JoinType,
        condition: Option<Expr>,
        order: Option<OrderBy>,
    },
    Union {
        all: bool,
    },
    /// Unites the request row with its history, partitioned and ordered.
    /// Producers are `[request, history]`.
    RequestUnion {
        groups: Vec<Expr>,
        order: Option<OrderBy>,
    },
    Project {
        kind: ProjectKind,
        limit: Option<usize>,
    },
    SimpleProject {
        sources: Vec<ColumnSource>,
    },
    Distinct,
    Rename {
        alias: String,
    },
    Limit {
        limit: usize,
        optimized: bool,
    },
}

impl PhysicalOp {
    /// Name used in plan explain output.
    pub fn type_name(&self) -> &'static str {
        match self {
            PhysicalOp::DataProvider { .. } => "DATA_PROVIDER",
            PhysicalOp::GroupBy { .. } => "GROUP_BY",
            PhysicalOp::SortBy { .. } => "SORT_BY",
            PhysicalOp::GroupAndSort { .. } => "GROUP_AND_SORT_BY",
            PhysicalOp::Filter { .. } => "FILTER",
            PhysicalOp::Join { .. } => "JOIN",
            PhysicalOp::Union { .. } => "UNION",
            PhysicalOp::RequestUnion { .. } => "REQUEST_UNION",
            PhysicalOp::Project { .. } => "PROJECT",
            PhysicalOp::SimpleProject { .. } => "SIMPLE_PROJECT",
            PhysicalOp::Distinct => "DISTINCT",
            PhysicalOp::Rename { .. } => "RENAME",
            PhysicalOp::Limit { .. } => "LIMIT",
        }
    }

    /// Number of producers a node of this kind takes.
    pub fn producer_count(&self) -> usize {
        match self {
            PhysicalOp::DataProvider { .. } => 0,
            PhysicalOp::Join { .. } | PhysicalOp::Union { .. } | PhysicalOp::RequestUnion { .. } => 2,
            _ => 1,
        }
    }

    /// Group keys of grouping operators.
    pub fn group_keys(&self) -> Option<&[Expr]> {
        match self {
            PhysicalOp::GroupBy { groups }
            | PhysicalOp::GroupAndSort { groups, .. }
            | PhysicalOp::RequestUnion { groups, .. } => Some(groups),
            _ => None,
        }
    }

    /// Expressions evaluated by this node outside of a project function:
    /// keys, orders and conditions. Empty when nothing needs compiling.
    pub fn key_exprs(&self) -> Vec<Expr> {
        let order_exprs = |order: &Option<OrderBy>| -> Vec<Expr> {
            order.as_ref().map(|o| o.exprs.clone()).unwrap_or_default()
        };
        match self {
            PhysicalOp::GroupBy { groups } => groups.clone(),
            PhysicalOp::SortBy { order } => order.exprs.clone(),
            PhysicalOp::GroupAndSort { groups, order }
            | PhysicalOp::RequestUnion { groups, order } => {
                let mut exprs = groups.clone();
                exprs.extend(order_exprs(order));
                exprs
            }
            PhysicalOp::Filter { condition } => vec![condition.clone()],
            PhysicalOp::Join {
                condition, order, ..
            } => {
                let mut exprs: Vec<Expr> = condition.iter().cloned().collect();
                exprs.extend(order_exprs(order));
                exprs
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_exprs() {
        let op = PhysicalOp::GroupAndSort {
            groups: vec![Expr::column("col1")],
            order: Some(OrderBy::asc(Expr::column("col5"))),
        };
        assert_eq!(op.key_exprs(), vec![Expr::column("col1"), Expr::column("col5")]);
        assert_eq!(op.group_keys(), Some(&[Expr::column("col1")][..]));

        let join = PhysicalOp::Join {
            join_type: JoinType::Concat,
            condition: None,
            order: None,
        };
        assert!(join.key_exprs().is_empty());
        assert_eq!(join.producer_count(), 2);

        let last = PhysicalOp::Join {
            join_type: JoinType::Last,
            condition: Some(Expr::column("col1")),
            order: Some(OrderBy::asc(Expr::qualified("t2", "col5"))),
        };
        assert_eq!(
            last.key_exprs(),
            vec![Expr::column("col1"), Expr::qualified("t2", "col5")]
        );
        assert!(PhysicalOp::Distinct.key_exprs().is_empty());
    }

    #[test]
    fn test_project_kind() {
        assert!(ProjectKind::TableProject.is_row_mode());
        assert!(!ProjectKind::Aggregation.is_row_mode());
        assert_eq!(
            ProjectKind::GroupAggregation { groups: vec![] }.name(),
            "GroupAggregation"
        );
    }
}
