//! Compilation of project nodes.
//!
//! Every project list is compiled against the same input. When a project has
//! more than one list, or its output order differs from the list order, the
//! list outputs are stitched together with CONCAT joins and a simple project
//! picks the output columns in SELECT order.
//!
//! In request mode the input row itself heads the CONCAT chain: `*` and bare
//! column items are read straight from it instead of being compiled.

use tracing::debug;

use super::transformer::TransformSession;
use crate::physical::{ColumnSource, NodeId, OutputType, PhysicalOp, ProjectKind, ProviderKind, Schema};
use crate::planner::{JoinType, PlanError, PlanResult, ProjectItem, ProjectList, WindowDef};
use crate::sql::Expr;

impl<'a, 'c> TransformSession<'a, 'c> {
    pub(super) fn transform_project(
        &mut self,
        input: NodeId,
        lists: &'a [ProjectList],
        pos_mapping: &[(usize, usize)],
    ) -> PlanResult<NodeId> {
        if lists.is_empty() {
            return Err(PlanError::Plan("project without project lists".into()));
        }
        for &(l, i) in pos_mapping {
            if lists.get(l).map_or(true, |list| i >= list.items.len()) {
                return Err(PlanError::Plan(format!(
                    "position ({}, {}) out of project lists",
                    l, i
                )));
            }
        }

        if self.is_request_row(input) {
            return self.transform_request_project(input, lists, pos_mapping);
        }

        let identity = lists.len() == 1
            && pos_mapping.len() == lists[0].items.len()
            && pos_mapping
                .iter()
                .enumerate()
                .all(|(n, &(l, i))| l == 0 && i == n);
        if identity {
            return self.compile_list(input, &lists[0], &lists[0].items);
        }

        let input_schema = self.arena.node(input).schema().clone();
        let mut members = Vec::with_capacity(lists.len());
        let mut positions: Vec<Vec<Vec<usize>>> = Vec::with_capacity(lists.len());
        let mut offset = 0;
        for list in lists {
            let id = self.compile_list(input, list, &list.items)?;
            let mut start = offset;
            let mut item_positions = Vec::with_capacity(list.items.len());
            for item in &list.items {
                let width = item_width(&input_schema, item)?;
                item_positions.push((start..start + width).collect());
                start += width;
            }
            offset += self.arena.node(id).schema().len();
            positions.push(item_positions);
            members.push(id);
        }

        let columns = pos_mapping
            .iter()
            .flat_map(|&(l, i)| positions[l][i].iter().copied())
            .collect();
        self.assemble(members, columns)
    }

    fn transform_request_project(
        &mut self,
        input: NodeId,
        lists: &'a [ProjectList],
        pos_mapping: &[(usize, usize)],
    ) -> PlanResult<NodeId> {
        let input_schema = self.arena.node(input).schema().clone();
        let mut members = vec![input];
        let mut offset = input_schema.len();
        let mut positions: Vec<Vec<Vec<usize>>> = Vec::with_capacity(lists.len());

        for list in lists {
            let mut item_positions = vec![Vec::new(); list.items.len()];
            let mut compiled = Vec::new();
            let mut compiled_idx = Vec::new();
            for (i, item) in list.items.iter().enumerate() {
                match pass_through(&input_schema, item)? {
                    Some(cols) => item_positions[i] = cols,
                    None => {
                        compiled_idx.push(i);
                        compiled.push(item.clone());
                    }
                }
            }
            if !compiled.is_empty() {
                let id = self.compile_list(input, list, &compiled)?;
                for (k, &i) in compiled_idx.iter().enumerate() {
                    item_positions[i] = vec![offset + k];
                }
                offset += self.arena.node(id).schema().len();
                members.push(id);
            }
            positions.push(item_positions);
        }

        let columns = pos_mapping
            .iter()
            .flat_map(|&(l, i)| positions[l][i].iter().copied())
            .collect();
        self.assemble(members, columns)
    }

    /// CONCAT-join `members` in order and select `columns` of the result.
    fn assemble(&mut self, members: Vec<NodeId>, columns: Vec<usize>) -> PlanResult<NodeId> {
        let mut members = members.into_iter();
        let Some(mut joined) = members.next() else {
            return Err(PlanError::Plan("nothing to project".into()));
        };
        for member in members {
            joined = self.arena.create(
                PhysicalOp::Join {
                    join_type: JoinType::Concat,
                    condition: None,
                    order: None,
                },
                vec![joined, member],
            )?;
        }

        let schema = self.arena.node(joined).schema();
        let sources = columns
            .into_iter()
            .map(|position| {
                schema
                    .column(position)
                    .map(|c| ColumnSource {
                        position,
                        name: c.name.clone(),
                    })
                    .ok_or_else(|| {
                        PlanError::Plan(format!(
                            "project column {} out of range for {} columns",
                            position,
                            schema.len()
                        ))
                    })
            })
            .collect::<PlanResult<Vec<_>>>()?;
        self.arena
            .create(PhysicalOp::SimpleProject { sources }, vec![joined])
    }

    /// Compile `items` of `list` over `input`.
    fn compile_list(
        &mut self,
        input: NodeId,
        list: &'a ProjectList,
        items: &[ProjectItem],
    ) -> PlanResult<NodeId> {
        match items {
            [] => return Err(PlanError::Plan("empty project list".into())),
            [only] if matches!(only.expr, Expr::All { relation: None }) => return Ok(input),
            _ => {}
        }

        let window = list.window.as_ref().filter(|_| list.is_window_agg);
        let producer = match window {
            Some(window) => self.window_producer(input, window)?,
            None => input,
        };
        let has_aggregation = items.iter().any(|i| i.is_aggregation);
        let kind = self.project_kind(producer, window, has_aggregation);

        if self.config.simple_project && kind.is_row_mode() {
            if let Some(sources) = simple_sources(self.arena.node(producer).schema(), items)? {
                return self
                    .arena
                    .create(PhysicalOp::SimpleProject { sources }, vec![producer]);
            }
        }

        let exprs: Vec<(String, Expr)> = items
            .iter()
            .map(|i| (i.name.clone(), i.expr.clone()))
            .collect();
        let fn_info = self.compiler.compile(
            self.arena.node(producer).schema(),
            &exprs,
            kind.is_row_mode(),
        )?;
        debug!(fn_name = %fn_info.fn_name, kind = kind.name(), "compiled project list");
        self.arena.create_project(kind, None, producer, fn_info)
    }

    /// Partition and order the input of a window, merging its extra sources.
    fn window_producer(&mut self, input: NodeId, window: &'a WindowDef) -> PlanResult<NodeId> {
        let mut unions = Vec::with_capacity(window.union_tables.len());
        for table in &window.union_tables {
            unions.push(self.transform_plan_op(table)?);
        }
        let order = window.order_by.clone();

        if self.is_request_row(input) {
            if let Some(mut history) = self.history_of(input)? {
                for source in unions {
                    history = self
                        .arena
                        .create(PhysicalOp::Union { all: true }, vec![history, source])?;
                }
                return self.arena.create(
                    PhysicalOp::RequestUnion {
                        groups: window.partition_by.clone(),
                        order,
                    },
                    vec![input, history],
                );
            }
        }

        let mut source = input;
        for other in unions {
            source = self
                .arena
                .create(PhysicalOp::Union { all: true }, vec![source, other])?;
        }
        if window.partition_by.is_empty() && order.is_none() {
            return Ok(source);
        }
        self.arena.create(
            PhysicalOp::GroupAndSort {
                groups: window.partition_by.clone(),
                order,
            },
            vec![source],
        )
    }

    fn project_kind(
        &self,
        producer: NodeId,
        window: Option<&WindowDef>,
        has_aggregation: bool,
    ) -> ProjectKind {
        if let Some(window) = window {
            return ProjectKind::WindowAggregation {
                partition_by: window.partition_by.clone(),
                order: window.order_by.clone(),
                frame: window.frame,
            };
        }
        match self.arena.node(producer).output_type() {
            OutputType::Group => ProjectKind::GroupAggregation {
                groups: self.group_keys_of(producer),
            },
            OutputType::Row | OutputType::Table if has_aggregation => ProjectKind::Aggregation,
            OutputType::Row => ProjectKind::RowProject,
            OutputType::Table => ProjectKind::TableProject,
        }
    }

    /// Keys of the closest grouping operator at or below `id`.
    fn group_keys_of(&self, mut id: NodeId) -> Vec<Expr> {
        loop {
            let node = self.arena.node(id);
            if let Some(keys) = node.op().group_keys() {
                return keys.to_vec();
            }
            if let PhysicalOp::DataProvider {
                kind: ProviderKind::Partition { index },
                table,
            } = node.op()
            {
                return table
                    .indexes
                    .get(index)
                    .map(|idx| idx.keys.iter().map(Expr::column).collect())
                    .unwrap_or_default();
            }
            match node.producer(0) {
                Some(producer) => id = producer,
                None => return vec![],
            }
        }
    }
}

/// Number of output columns an item produces.
fn item_width(input: &Schema, item: &ProjectItem) -> PlanResult<usize> {
    match &item.expr {
        Expr::All { relation } => expand(input, relation.as_deref()).map(|p| p.len()),
        _ => Ok(1),
    }
}

/// Input columns of an item that can be read without compiling it.
fn pass_through(input: &Schema, item: &ProjectItem) -> PlanResult<Option<Vec<usize>>> {
    match &item.expr {
        Expr::All { relation } => expand(input, relation.as_deref()).map(Some),
        expr => match expr.as_column() {
            Some(col) => input
                .resolve(col)
                .map(|pos| Some(vec![pos]))
                .ok_or_else(|| PlanError::ColumnNotFound(col.to_string())),
            None => Ok(None),
        },
    }
}

fn expand(input: &Schema, relation: Option<&str>) -> PlanResult<Vec<usize>> {
    let positions = input.expand_all(relation);
    match relation {
        Some(r) if positions.is_empty() => Err(PlanError::ColumnNotFound(format!("{}.*", r))),
        _ => Ok(positions),
    }
}

/// Column remap for a list made only of column references and stars.
fn simple_sources(input: &Schema, items: &[ProjectItem]) -> PlanResult<Option<Vec<ColumnSource>>> {
    if !items
        .iter()
        .all(|i| i.is_all() || i.expr.as_column().is_some())
    {
        return Ok(None);
    }

    let mut sources = Vec::new();
    for item in items {
        match &item.expr {
            Expr::All { relation } => {
                for position in expand(input, relation.as_deref())? {
                    let name = input
                        .column(position)
                        .map(|c| c.name.clone())
                        .unwrap_or_default();
                    sources.push(ColumnSource { position, name });
                }
            }
            expr => {
                let Some(col) = expr.as_column() else {
                    return Ok(None);
                };
                let position = input
                    .resolve(col)
                    .ok_or_else(|| PlanError::ColumnNotFound(col.to_string()))?;
                sources.push(ColumnSource {
                    position,
                    name: item.name.clone(),
                });
            }
        }
    }
    Ok(Some(sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::physical::Column;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("col1", Some("t1".into()), DataType::Int32),
            Column::new("col2", Some("t1".into()), DataType::Int16),
        ])
        .concat(&Schema::new(vec![Column::new(
            "col1",
            Some("t2".into()),
            DataType::Int32,
        )]))
    }

    #[test]
    fn test_item_width() {
        let star = ProjectItem::new("*", Expr::All { relation: None });
        let t2_star = ProjectItem::new("t2.*", Expr::All { relation: Some("t2".into()) });
        let col = ProjectItem::new("a", Expr::column("col2"));
        assert_eq!(item_width(&schema(), &star).unwrap(), 3);
        assert_eq!(item_width(&schema(), &t2_star).unwrap(), 1);
        assert_eq!(item_width(&schema(), &col).unwrap(), 1);

        let t9_star = ProjectItem::new("t9.*", Expr::All { relation: Some("t9".into()) });
        assert!(matches!(
            item_width(&schema(), &t9_star),
            Err(PlanError::ColumnNotFound(ref c)) if c == "t9.*"
        ));
    }

    #[test]
    fn test_pass_through() {
        let item = ProjectItem::new("x", Expr::qualified("t2", "col1"));
        assert_eq!(pass_through(&schema(), &item).unwrap(), Some(vec![2]));

        let sum = ProjectItem::new("s", Expr::call("sum", vec![Expr::column("col1")]));
        assert_eq!(pass_through(&schema(), &sum).unwrap(), None);

        let missing = ProjectItem::new("m", Expr::column("nope"));
        assert!(matches!(
            pass_through(&schema(), &missing),
            Err(PlanError::ColumnNotFound(_))
        ));
        let bad_star = ProjectItem::new("*", Expr::All { relation: Some("t9".into()) });
        assert!(pass_through(&schema(), &bad_star).is_err());
    }

    #[test]
    fn test_simple_sources() {
        let items = vec![
            ProjectItem::new("b", Expr::column("col2")),
            ProjectItem::new("*", Expr::All { relation: Some("t2".into()) }),
        ];
        let sources = simple_sources(&schema(), &items).unwrap().unwrap();
        assert_eq!(
            sources,
            vec![
                ColumnSource { position: 1, name: "b".into() },
                ColumnSource { position: 2, name: "col1".into() },
            ]
        );

        let computed = vec![ProjectItem::new(
            "c",
            Expr::call("abs", vec![Expr::column("col1")]),
        )];
        assert_eq!(simple_sources(&schema(), &computed).unwrap(), None);
    }
}
