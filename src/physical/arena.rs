//! Arena owning every physical node of one compilation.
//!
//! Nodes are immutable once created: their schema and output type are
//! derived from the operator and its producers at construction. Rewrites
//! create new nodes and leave the old ones in place, so a handle stays valid
//! for the lifetime of the arena. The only late-bound field is the function
//! binding, which is set at most once.

use std::cell::OnceCell;
use std::fmt;

use tracing::trace;

use super::op::{OutputType, PhysicalOp, ProjectKind, ProviderKind};
use super::schema::{Column, Schema};
use crate::codegen::FnInfo;
use crate::planner::{PlanError, PlanResult};

/// Handle of a node inside a [`PhysicalPlanArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A physical operator with its producers and derived output.
#[derive(Debug)]
pub struct PhysicalNode {
    op: PhysicalOp,
    producers: Vec<NodeId>,
    schema: Schema,
    output_type: OutputType,
    fn_info: OnceCell<FnInfo>,
}

impl PhysicalNode {
    pub fn op(&self) -> &PhysicalOp {
        &self.op
    }

    pub fn producers(&self) -> &[NodeId] {
        &self.producers
    }

    pub fn producer(&self, i: usize) -> Option<NodeId> {
        self.producers.get(i).copied()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// The compiled function, once bound.
    pub fn fn_info(&self) -> Option<&FnInfo> {
        self.fn_info.get()
    }
}

/// Owner of the nodes of one physical plan.
#[derive(Debug, Default)]
pub struct PhysicalPlanArena {
    nodes: Vec<PhysicalNode>,
}

impl PhysicalPlanArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node behind `id`. Handles are only minted by this arena.
    pub fn node(&self, id: NodeId) -> &PhysicalNode {
        &self.nodes[id.0]
    }

    pub fn op(&self, id: NodeId) -> &PhysicalOp {
        &self.node(id).op
    }

    /// Create a node whose schema is derived from its producers.
    ///
    /// Project nodes take their schema from a compiled function and must be
    /// created with [`create_project`](Self::create_project).
    pub fn create(&mut self, op: PhysicalOp, producers: Vec<NodeId>) -> PlanResult<NodeId> {
        if matches!(op, PhysicalOp::Project { .. }) {
            return Err(PlanError::Plan(
                "project node requires a compiled function".into(),
            ));
        }
        self.build(op, producers, None)
    }

    /// Create a project node producing the schema of `fn_info`.
    pub fn create_project(
        &mut self,
        kind: ProjectKind,
        limit: Option<usize>,
        input: NodeId,
        fn_info: FnInfo,
    ) -> PlanResult<NodeId> {
        self.build(PhysicalOp::Project { kind, limit }, vec![input], Some(fn_info))
    }

    /// Copy of `id` reading from `producers`.
    ///
    /// A project keeps its function; other bindings are not carried over
    /// because they were compiled against the old producers.
    pub fn with_producers(&mut self, id: NodeId, producers: Vec<NodeId>) -> PlanResult<NodeId> {
        let node = self.node(id);
        let op = node.op.clone();
        let fn_info = match op {
            PhysicalOp::Project { .. } => node.fn_info().cloned(),
            _ => None,
        };
        self.build(op, producers, fn_info)
    }

    /// Copy of `id` with a different operator over the same producers.
    pub fn with_op(&mut self, id: NodeId, op: PhysicalOp) -> PlanResult<NodeId> {
        let node = self.node(id);
        let producers = node.producers.clone();
        let fn_info = match (&node.op, &op) {
            (PhysicalOp::Project { .. }, PhysicalOp::Project { .. }) => node.fn_info().cloned(),
            (_, PhysicalOp::Project { .. }) => {
                return Err(PlanError::Plan(
                    "project node requires a compiled function".into(),
                ))
            }
            _ => None,
        };
        self.build(op, producers, fn_info)
    }

    /// Attach the compiled function of `id`. A node is bound at most once.
    pub fn bind_fn(&self, id: NodeId, fn_info: FnInfo) -> PlanResult<()> {
        let node = self.node(id);
        node.fn_info.set(fn_info).map_err(|_| {
            PlanError::Plan(format!(
                "{} node {} is already bound",
                node.op.type_name(),
                id
            ))
        })
    }

    fn build(
        &mut self,
        op: PhysicalOp,
        producers: Vec<NodeId>,
        fn_info: Option<FnInfo>,
    ) -> PlanResult<NodeId> {
        if producers.len() != op.producer_count() {
            return Err(PlanError::Plan(format!(
                "{} expects {} producers, got {}",
                op.type_name(),
                op.producer_count(),
                producers.len()
            )));
        }

        let schema = match &fn_info {
            Some(info) => info.fn_schema.clone(),
            None => self.derive_schema(&op, &producers)?,
        };
        let output_type = self.derive_output_type(&op, &producers);

        let fn_cell = OnceCell::new();
        if let Some(info) = fn_info {
            let _ = fn_cell.set(info);
        }

        let id = NodeId(self.nodes.len());
        trace!(node = %id, op = op.type_name(), "create physical node");
        self.nodes.push(PhysicalNode {
            op,
            producers,
            schema,
            output_type,
            fn_info: fn_cell,
        });
        Ok(id)
    }

    fn derive_schema(&self, op: &PhysicalOp, producers: &[NodeId]) -> PlanResult<Schema> {
        let input = |i: usize| self.node(producers[i]).schema();
        match op {
            PhysicalOp::DataProvider { table, .. } => Ok(Schema::from_table(table)),
            PhysicalOp::Rename { alias } => Ok(input(0).with_relation(alias)),
            PhysicalOp::Join { .. } => Ok(input(0).concat(input(1))),
            PhysicalOp::Union { .. } | PhysicalOp::RequestUnion { .. } => {
                if input(0).len() != input(1).len() {
                    return Err(PlanError::Plan(format!(
                        "{} inputs have {} and {} columns",
                        op.type_name(),
                        input(0).len(),
                        input(1).len()
                    )));
                }
                Ok(input(0).clone())
            }
            PhysicalOp::SimpleProject { sources } => {
                let from = input(0);
                let columns = sources
                    .iter()
                    .map(|s| {
                        let c = from.column(s.position).ok_or_else(|| {
                            PlanError::Plan(format!(
                                "simple project source {} out of range for {} columns",
                                s.position,
                                from.len()
                            ))
                        })?;
                        let relation = if c.name == s.name {
                            c.relation.clone()
                        } else {
                            None
                        };
                        Ok(Column::new(s.name.clone(), relation, c.data_type))
                    })
                    .collect::<PlanResult<Vec<_>>>()?;
                Ok(Schema::new(columns))
            }
            PhysicalOp::Project { .. } => Err(PlanError::Plan(
                "project node requires a compiled function".into(),
            )),
            _ => Ok(input(0).clone()),
        }
    }

    fn derive_output_type(&self, op: &PhysicalOp, producers: &[NodeId]) -> OutputType {
        let input = |i: usize| self.node(producers[i]);
        match op {
            PhysicalOp::DataProvider { kind, .. } => match kind {
                ProviderKind::Table => OutputType::Table,
                ProviderKind::Request => OutputType::Row,
                ProviderKind::Partition { .. } => OutputType::Group,
            },
            PhysicalOp::GroupBy { .. } | PhysicalOp::GroupAndSort { .. } => OutputType::Group,
            PhysicalOp::Union { .. } | PhysicalOp::RequestUnion { .. } => OutputType::Table,
            PhysicalOp::Project { kind, .. } => match kind {
                ProjectKind::RowProject | ProjectKind::Aggregation => OutputType::Row,
                ProjectKind::TableProject | ProjectKind::GroupAggregation { .. } => {
                    OutputType::Table
                }
                ProjectKind::WindowAggregation { .. } => {
                    if matches!(input(0).op, PhysicalOp::RequestUnion { .. }) {
                        OutputType::Row
                    } else {
                        OutputType::Table
                    }
                }
            },
            _ => input(0).output_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{DataType, TableBuilder};
    use crate::physical::ColumnSource;
    use crate::planner::JoinType;
    use crate::sql::Expr;

    fn provider(arena: &mut PhysicalPlanArena, name: &str, kind: ProviderKind) -> NodeId {
        let table = TableBuilder::new("db", name)
            .add_column("col1", DataType::Int32)
            .add_column("col5", DataType::Int64)
            .build()
            .unwrap();
        arena
            .create(
                PhysicalOp::DataProvider {
                    kind,
                    table: Arc::new(table),
                },
                vec![],
            )
            .unwrap()
    }

    fn fn_info(name: &str) -> FnInfo {
        FnInfo {
            fn_name: name.into(),
            fn_schema: Schema::new(vec![Column::new("x", None, DataType::Int64)]),
        }
    }

    #[test]
    fn test_schema_and_output_type() {
        let mut arena = PhysicalPlanArena::new();
        let t1 = provider(&mut arena, "t1", ProviderKind::Table);
        let t2 = provider(&mut arena, "t2", ProviderKind::Partition { index: "i".into() });
        assert_eq!(arena.node(t2).output_type(), OutputType::Group);

        let join = arena
            .create(
                PhysicalOp::Join {
                    join_type: JoinType::Last,
                    condition: None,
                    order: None,
                },
                vec![t1, t2],
            )
            .unwrap();
        assert_eq!(arena.node(join).schema().len(), 4);
        assert_eq!(arena.node(join).schema().part_count(), 2);
        assert_eq!(arena.node(join).output_type(), OutputType::Table);

        let group = arena
            .create(PhysicalOp::GroupBy { groups: vec![Expr::column("col1")] }, vec![t1])
            .unwrap();
        assert_eq!(arena.node(group).output_type(), OutputType::Group);

        let simple = arena
            .create(
                PhysicalOp::SimpleProject {
                    sources: vec![ColumnSource {
                        position: 1,
                        name: "c".into(),
                    }],
                },
                vec![t1],
            )
            .unwrap();
        assert_eq!(arena.node(simple).schema().column_names(), vec!["c"]);
    }

    #[test]
    fn test_invalid_nodes() {
        let mut arena = PhysicalPlanArena::new();
        let t1 = provider(&mut arena, "t1", ProviderKind::Table);
        assert!(arena.create(PhysicalOp::Distinct, vec![]).is_err());
        assert!(arena
            .create(
                PhysicalOp::Project {
                    kind: ProjectKind::TableProject,
                    limit: None
                },
                vec![t1]
            )
            .is_err());
        let out_of_range = PhysicalOp::SimpleProject {
            sources: vec![ColumnSource {
                position: 7,
                name: "c".into(),
            }],
        };
        assert!(arena.create(out_of_range, vec![t1]).is_err());
    }

    #[test]
    fn test_bind_once() {
        let mut arena = PhysicalPlanArena::new();
        let t1 = provider(&mut arena, "t1", ProviderKind::Table);
        let filter = arena
            .create(PhysicalOp::Filter { condition: Expr::column("col1") }, vec![t1])
            .unwrap();
        assert!(arena.node(filter).fn_info().is_none());
        arena.bind_fn(filter, fn_info("f0")).unwrap();
        assert!(arena.bind_fn(filter, fn_info("f1")).is_err());
        assert_eq!(arena.node(filter).fn_info().unwrap().fn_name, "f0");
    }

    #[test]
    fn test_copy_on_write() {
        let mut arena = PhysicalPlanArena::new();
        let t1 = provider(&mut arena, "t1", ProviderKind::Table);
        let t1b = provider(&mut arena, "t1", ProviderKind::Request);
        let project = arena
            .create_project(ProjectKind::TableProject, None, t1, fn_info("f0"))
            .unwrap();
        assert_eq!(arena.node(project).schema().column_names(), vec!["x"]);

        let relinked = arena.with_producers(project, vec![t1b]).unwrap();
        assert_ne!(relinked, project);
        assert_eq!(arena.node(relinked).producers(), &[t1b]);
        assert_eq!(arena.node(relinked).fn_info().unwrap().fn_name, "f0");
        assert_eq!(arena.node(project).producers(), &[t1]);

        let limited = arena
            .with_op(
                project,
                PhysicalOp::Project {
                    kind: ProjectKind::TableProject,
                    limit: Some(5),
                },
            )
            .unwrap();
        assert!(matches!(
            arena.op(limited),
            PhysicalOp::Project { limit: Some(5), .. }
        ));
        assert!(arena.with_op(t1, PhysicalOp::Project { kind: ProjectKind::RowProject, limit: None }).is_err());
    }
}
