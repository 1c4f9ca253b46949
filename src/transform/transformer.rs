//! Logical to physical plan transformation.
//!
//! [`PlanTransformer`] compiles a list of logical plans in three steps:
//!
//! 1. every logical node is compiled once into the arena, memoized by
//!    structure so equal subtrees share one physical node;
//! 2. the registered passes rewrite the physical DAG bottom-up;
//! 3. nodes that evaluate keys or conditions are bound to compiled
//!    functions. Projects are bound while compiling since their schema is
//!    the function's schema.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::memo::LogicalOpKey;
use crate::catalog::Catalog;
use crate::codegen::{ExprCompiler, FnInfo, SchemaInferCompiler};
use crate::config::TransformConfig;
use crate::passes::{apply_pass, build_pass, PhysicalPass};
use crate::physical::{
    NodeId, OutputType, PhysicalOp, PhysicalPlan, PhysicalPlanArena, ProviderKind,
};
use crate::planner::{LogicalPlan, PlanError, PlanResult, QueryPlanner};
use crate::sql::Expr;

/// Compiles logical plans into optimized physical plans.
pub struct PlanTransformer {
    config: TransformConfig,
    catalog: Arc<dyn Catalog>,
    compiler: Box<dyn ExprCompiler>,
    passes: Vec<Box<dyn PhysicalPass>>,
}

impl PlanTransformer {
    /// Create a transformer with the passes named in `config` and the
    /// schema-inferring expression compiler.
    pub fn new(config: TransformConfig, catalog: Arc<dyn Catalog>) -> PlanResult<Self> {
        config.validate()?;
        let passes = config
            .passes
            .iter()
            .map(|kind| build_pass(*kind, &config))
            .collect();
        Ok(Self {
            config,
            catalog,
            compiler: Box::new(SchemaInferCompiler::new()),
            passes,
        })
    }

    pub fn with_compiler(mut self, compiler: Box<dyn ExprCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Register a pass after the configured ones.
    pub fn add_pass(&mut self, pass: Box<dyn PhysicalPass>) {
        self.passes.push(pass);
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Plan and compile a SQL query.
    pub fn transform_sql(&mut self, sql: &str) -> PlanResult<PhysicalPlan> {
        let planner = QueryPlanner::new(self.config.db.clone())
            .with_request_mode(self.config.is_request_mode());
        let plan = planner.plan_sql(sql).inspect_err(|e| {
            warn!(code = %e.code(), error = %e, "fail to plan sql");
        })?;
        self.transform_physical_plan(std::slice::from_ref(&plan))
    }

    /// Compile `plans` into one physical plan.
    ///
    /// Function definitions are registered first. The last query tree in the
    /// list becomes the root of the result.
    pub fn transform_physical_plan(&mut self, plans: &[LogicalPlan]) -> PlanResult<PhysicalPlan> {
        self.transform(plans).inspect_err(|e| {
            warn!(code = %e.code(), error = %e, "fail to transform physical plan");
        })
    }

    fn transform(&mut self, plans: &[LogicalPlan]) -> PlanResult<PhysicalPlan> {
        if plans.is_empty() {
            return Err(PlanError::Input("logical plan list is empty".into()));
        }

        for plan in plans {
            if let LogicalPlan::FuncDef(def) = plan {
                self.compiler.define_function(def)?;
            }
        }

        let mut session = TransformSession::new(
            &self.config,
            self.catalog.as_ref(),
            self.compiler.as_mut(),
        );
        let mut root = None;
        for plan in plans {
            match plan {
                LogicalPlan::FuncDef(_) => {}
                LogicalPlan::Create { .. } | LogicalPlan::Insert { .. } | LogicalPlan::Cmd { .. } => {
                    return Err(PlanError::Plan(format!(
                        "can't handle type {}",
                        plan.type_name()
                    )))
                }
                query => root = Some(session.transform_plan_op(query)?),
            }
        }
        let Some(mut root) = root else {
            return Err(PlanError::Input("no query to transform".into()));
        };
        let TransformSession { mut arena, .. } = session;

        for pass in &self.passes {
            (root, _) = apply_pass(pass.as_ref(), &mut arena, root)?;
        }

        bind_functions(self.compiler.as_mut(), &arena, root)?;
        debug!(nodes = arena.len(), root = %root, "transformed physical plan");
        Ok(PhysicalPlan::new(arena, root))
    }
}

/// Compile the keys and conditions of every reachable node that needs them.
fn bind_functions(
    compiler: &mut dyn ExprCompiler,
    arena: &PhysicalPlanArena,
    root: NodeId,
) -> PlanResult<()> {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let node = arena.node(id);
        stack.extend(node.producers().iter().copied());

        let exprs = node.op().key_exprs();
        if exprs.is_empty() || node.fn_info().is_some() {
            continue;
        }
        let input = match node.op() {
            PhysicalOp::Join { .. } => node.schema(),
            _ => match node.producer(0) {
                Some(producer) => arena.node(producer).schema(),
                None => continue,
            },
        };
        let named: Vec<(String, Expr)> = exprs.into_iter().map(|e| (e.to_string(), e)).collect();
        let fn_info: FnInfo = compiler.compile(input, &named, true)?;
        arena.bind_fn(id, fn_info)?;
    }
    Ok(())
}

/// State of one compilation: the arena being filled and the memo.
pub(super) struct TransformSession<'a, 'c> {
    pub(super) config: &'c TransformConfig,
    catalog: &'c dyn Catalog,
    pub(super) compiler: &'c mut dyn ExprCompiler,
    pub(super) arena: PhysicalPlanArena,
    memo: HashMap<LogicalOpKey<'a>, NodeId>,
}

impl<'a, 'c> TransformSession<'a, 'c> {
    fn new(
        config: &'c TransformConfig,
        catalog: &'c dyn Catalog,
        compiler: &'c mut dyn ExprCompiler,
    ) -> Self {
        Self {
            config,
            catalog,
            compiler,
            arena: PhysicalPlanArena::new(),
            memo: HashMap::new(),
        }
    }

    /// Compile `plan`, reusing the node of a structurally equal subtree.
    pub(super) fn transform_plan_op(&mut self, plan: &'a LogicalPlan) -> PlanResult<NodeId> {
        let key = LogicalOpKey(plan);
        if let Some(&id) = self.memo.get(&key) {
            debug!(op = plan.type_name(), node = %id, "reuse physical node");
            return Ok(id);
        }

        let id = match plan {
            LogicalPlan::Table {
                db,
                table,
                is_primary,
            } => self.transform_table(db, table, *is_primary)?,
            LogicalPlan::Filter { input, condition } => {
                let input = self.transform_plan_op(input)?;
                self.arena.create(
                    PhysicalOp::Filter {
                        condition: condition.clone(),
                    },
                    vec![input],
                )?
            }
            LogicalPlan::Group { input, keys } => {
                let input = self.transform_plan_op(input)?;
                self.transform_group(input, keys)?
            }
            LogicalPlan::Sort { input, order } => {
                let input = self.transform_plan_op(input)?;
                self.arena.create(
                    PhysicalOp::SortBy {
                        order: order.clone(),
                    },
                    vec![input],
                )?
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition,
                order,
            } => {
                let left = self.transform_plan_op(left)?;
                let right = self.transform_plan_op(right)?;
                self.arena.create(
                    PhysicalOp::Join {
                        join_type: *join_type,
                        condition: condition.clone(),
                        order: order.clone(),
                    },
                    vec![left, right],
                )?
            }
            LogicalPlan::Union { left, right, all } => {
                let left = self.transform_plan_op(left)?;
                let right = self.transform_plan_op(right)?;
                self.arena
                    .create(PhysicalOp::Union { all: *all }, vec![left, right])?
            }
            LogicalPlan::Project {
                input,
                lists,
                pos_mapping,
            } => {
                let input = self.transform_plan_op(input)?;
                self.transform_project(input, lists, pos_mapping)?
            }
            LogicalPlan::Limit { input, limit } => {
                let input = self.transform_plan_op(input)?;
                self.arena.create(
                    PhysicalOp::Limit {
                        limit: *limit,
                        optimized: false,
                    },
                    vec![input],
                )?
            }
            LogicalPlan::Rename { input, alias } => {
                let input = self.transform_plan_op(input)?;
                self.arena.create(
                    PhysicalOp::Rename {
                        alias: alias.clone(),
                    },
                    vec![input],
                )?
            }
            LogicalPlan::Distinct { input } => {
                let input = self.transform_plan_op(input)?;
                self.arena.create(PhysicalOp::Distinct, vec![input])?
            }
            LogicalPlan::Query { input } => self.transform_plan_op(input)?,
            LogicalPlan::Create { .. }
            | LogicalPlan::Insert { .. }
            | LogicalPlan::Cmd { .. }
            | LogicalPlan::FuncDef(_) => {
                return Err(PlanError::Plan(format!(
                    "can't handle type {}",
                    plan.type_name()
                )))
            }
        };

        self.memo.insert(key, id);
        Ok(id)
    }

    fn transform_table(&mut self, db: &str, table: &str, is_primary: bool) -> PlanResult<NodeId> {
        let db = if db.is_empty() {
            self.config.db.as_str()
        } else {
            db
        };
        let handle = self
            .catalog
            .get_table(db, table)
            .ok_or_else(|| PlanError::TableNotFound {
                db: db.to_string(),
                table: table.to_string(),
            })?;
        let kind = if is_primary && self.config.is_request_mode() {
            ProviderKind::Request
        } else {
            ProviderKind::Table
        };
        self.arena.create(
            PhysicalOp::DataProvider {
                kind,
                table: handle,
            },
            vec![],
        )
    }

    fn transform_group(&mut self, input: NodeId, keys: &[Expr]) -> PlanResult<NodeId> {
        if self.is_request_row(input) {
            if let Some(history) = self.history_of(input)? {
                return self.arena.create(
                    PhysicalOp::RequestUnion {
                        groups: keys.to_vec(),
                        order: None,
                    },
                    vec![input, history],
                );
            }
        }
        self.arena.create(
            PhysicalOp::GroupBy {
                groups: keys.to_vec(),
            },
            vec![input],
        )
    }

    pub(super) fn is_request_row(&self, id: NodeId) -> bool {
        self.config.is_request_mode() && self.arena.node(id).output_type() == OutputType::Row
    }

    /// The stored-history counterpart of a request-row subtree: the same
    /// nodes over a full table scan instead of the request row.
    pub(super) fn history_of(&mut self, id: NodeId) -> PlanResult<Option<NodeId>> {
        let node = self.arena.node(id);
        if let PhysicalOp::DataProvider {
            kind: ProviderKind::Request,
            table,
        } = node.op()
        {
            let table = table.clone();
            return self
                .arena
                .create(
                    PhysicalOp::DataProvider {
                        kind: ProviderKind::Table,
                        table,
                    },
                    vec![],
                )
                .map(Some);
        }

        let mut producers = node.producers().to_vec();
        let Some(&first) = producers.first() else {
            return Ok(None);
        };
        let Some(history) = self.history_of(first)? else {
            return Ok(None);
        };
        producers[0] = history;
        self.arena.with_producers(id, producers).map(Some)
    }
}
