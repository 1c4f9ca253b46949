//! Logical query plan representation.
//!
//! Logical plans represent *what* the query does, not *how* it will be executed.
//! They are immutable trees produced by the query planner and compiled into
//! physical plans by the transformer. Every type here has structural `Eq` and
//! `Hash`, which the transformer relies on to share identical subtrees.

use std::fmt;

use crate::catalog::DataType;

// Re-export SQL types used in plans.
pub use crate::sql::{ColumnRef, Expr, FrameBound, FrameUnits, WindowFrame};

/// Join types supported by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    /// Match each left row with the last right row satisfying the condition.
    Last,
    /// Positional pairing of rows; used to stitch project outputs together.
    Concat,
}

impl JoinType {
    /// Name used in plan explain output.
    pub fn name(&self) -> &'static str {
        match self {
            JoinType::Inner => "InnerJoin",
            JoinType::Left => "LeftJoin",
            JoinType::Right => "RightJoin",
            JoinType::Full => "FullJoin",
            JoinType::Cross => "CrossJoin",
            JoinType::Last => "LastJoin",
            JoinType::Concat => "ConcatJoin",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
            JoinType::Cross => write!(f, "CROSS"),
            JoinType::Last => write!(f, "LAST"),
            JoinType::Concat => write!(f, "CONCAT"),
        }
    }
}

/// Sort specification: one direction for the whole key list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub exprs: Vec<Expr>,
    pub ascending: bool,
}

impl OrderBy {
    pub fn new(exprs: Vec<Expr>, ascending: bool) -> Self {
        Self { exprs, ascending }
    }

    /// Ascending order on a single expression.
    pub fn asc(expr: Expr) -> Self {
        Self::new(vec![expr], true)
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        write!(
            f,
            "({}) {}",
            keys.join(","),
            if self.ascending { "ASC" } else { "DESC" }
        )
    }
}

/// A window a project list is evaluated over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowDef {
    pub name: String,
    pub partition_by: Vec<Expr>,
    pub order_by: Option<OrderBy>,
    pub frame: Option<WindowFrame>,
    /// Extra sources whose rows are merged into the window.
    pub union_tables: Vec<LogicalPlan>,
}

impl WindowDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_by: vec![],
            order_by: None,
            frame: None,
            union_tables: vec![],
        }
    }

    pub fn partition_by(mut self, keys: Vec<Expr>) -> Self {
        self.partition_by = keys;
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn frame(mut self, frame: WindowFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn union_table(mut self, plan: LogicalPlan) -> Self {
        self.union_tables.push(plan);
        self
    }
}

/// One output expression of a project list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectItem {
    pub name: String,
    pub expr: Expr,
    pub is_aggregation: bool,
}

impl ProjectItem {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        let is_aggregation = expr.contains_aggregate();
        Self {
            name: name.into(),
            expr,
            is_aggregation,
        }
    }

    /// `*` or `relation.*`.
    pub fn is_all(&self) -> bool {
        matches!(self.expr, Expr::All { .. })
    }
}

/// Expressions evaluated together, optionally over one window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectList {
    pub window: Option<WindowDef>,
    pub is_window_agg: bool,
    pub items: Vec<ProjectItem>,
}

impl ProjectList {
    /// Row-wise list without a window.
    pub fn new(items: Vec<ProjectItem>) -> Self {
        Self {
            window: None,
            is_window_agg: false,
            items,
        }
    }

    /// List aggregated over `window`.
    pub fn windowed(window: WindowDef, items: Vec<ProjectItem>) -> Self {
        Self {
            window: Some(window),
            is_window_agg: true,
            items,
        }
    }

    pub fn has_aggregation(&self) -> bool {
        self.items.iter().any(|i| i.is_aggregation)
    }

    /// A list consisting of a single unqualified `*`.
    pub fn is_star(&self) -> bool {
        matches!(
            self.items.as_slice(),
            [item] if matches!(item.expr, Expr::All { relation: None })
        )
    }
}

/// A user defined function declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnDef {
    pub name: String,
    pub args: Vec<DataType>,
    pub return_type: DataType,
}

/// Logical query plan.
///
/// This is a tree structure representing the logical operations of a query.
/// Each node transforms its input(s) in some way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalPlan {
    /// Scan a table. The primary table is the one served row by row in
    /// request mode.
    Table {
        db: String,
        table: String,
        is_primary: bool,
    },

    /// Filter rows based on a predicate.
    Filter {
        input: Box<LogicalPlan>,
        condition: Expr,
    },

    /// Group rows by key expressions.
    Group {
        input: Box<LogicalPlan>,
        keys: Vec<Expr>,
    },

    /// Sort rows.
    Sort {
        input: Box<LogicalPlan>,
        order: OrderBy,
    },

    /// Join two inputs.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        condition: Option<Expr>,
        /// Right side order, for LAST joins.
        order: Option<OrderBy>,
    },

    /// Union of two inputs.
    Union {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        all: bool,
    },

    /// Evaluate project lists and reassemble their outputs in SELECT order.
    Project {
        input: Box<LogicalPlan>,
        lists: Vec<ProjectList>,
        /// `(list, item)` for every output position.
        pos_mapping: Vec<(usize, usize)>,
    },

    /// Limit number of rows.
    Limit {
        input: Box<LogicalPlan>,
        limit: usize,
    },

    /// Re-qualify every column under a new relation name.
    Rename {
        input: Box<LogicalPlan>,
        alias: String,
    },

    /// Remove duplicate rows.
    Distinct { input: Box<LogicalPlan> },

    /// Root of a query tree.
    Query { input: Box<LogicalPlan> },

    /// CREATE TABLE.
    Create { table: String },

    /// INSERT INTO.
    Insert { table: String },

    /// Engine command such as `SHOW TABLES`.
    Cmd { args: Vec<String> },

    /// User defined function declaration.
    FuncDef(FnDef),
}

impl LogicalPlan {
    /// Scan of `db.table`.
    pub fn table(db: impl Into<String>, table: impl Into<String>) -> Self {
        LogicalPlan::Table {
            db: db.into(),
            table: table.into(),
            is_primary: false,
        }
    }

    pub fn filter(self, condition: Expr) -> Self {
        LogicalPlan::Filter {
            input: Box::new(self),
            condition,
        }
    }

    pub fn group(self, keys: Vec<Expr>) -> Self {
        LogicalPlan::Group {
            input: Box::new(self),
            keys,
        }
    }

    pub fn sort(self, order: OrderBy) -> Self {
        LogicalPlan::Sort {
            input: Box::new(self),
            order,
        }
    }

    pub fn join(self, right: LogicalPlan, join_type: JoinType, condition: Option<Expr>) -> Self {
        LogicalPlan::Join {
            left: Box::new(self),
            right: Box::new(right),
            join_type,
            condition,
            order: None,
        }
    }

    pub fn union(self, right: LogicalPlan, all: bool) -> Self {
        LogicalPlan::Union {
            left: Box::new(self),
            right: Box::new(right),
            all,
        }
    }

    /// Project the lists in order, each item at its natural position.
    pub fn project(self, lists: Vec<ProjectList>) -> Self {
        let pos_mapping = lists
            .iter()
            .enumerate()
            .flat_map(|(l, list)| (0..list.items.len()).map(move |i| (l, i)))
            .collect();
        LogicalPlan::Project {
            input: Box::new(self),
            lists,
            pos_mapping,
        }
    }

    pub fn limit(self, limit: usize) -> Self {
        LogicalPlan::Limit {
            input: Box::new(self),
            limit,
        }
    }

    pub fn rename(self, alias: impl Into<String>) -> Self {
        LogicalPlan::Rename {
            input: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn distinct(self) -> Self {
        LogicalPlan::Distinct {
            input: Box::new(self),
        }
    }

    pub fn query(self) -> Self {
        LogicalPlan::Query {
            input: Box::new(self),
        }
    }

    /// Short name of the node type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            LogicalPlan::Table { .. } => "kTable",
            LogicalPlan::Filter { .. } => "kFilter",
            LogicalPlan::Group { .. } => "kGroup",
            LogicalPlan::Sort { .. } => "kSort",
            LogicalPlan::Join { .. } => "kJoin",
            LogicalPlan::Union { .. } => "kUnion",
            LogicalPlan::Project { .. } => "kProject",
            LogicalPlan::Limit { .. } => "kLimit",
            LogicalPlan::Rename { .. } => "kRename",
            LogicalPlan::Distinct { .. } => "kDistinct",
            LogicalPlan::Query { .. } => "kQuery",
            LogicalPlan::Create { .. } => "kCreate",
            LogicalPlan::Insert { .. } => "kInsert",
            LogicalPlan::Cmd { .. } => "kCmd",
            LogicalPlan::FuncDef(_) => "kFuncDef",
        }
    }

    /// Mark the left-most table of this tree as the primary table.
    ///
    /// Returns false when the left-most leaf is not a table.
    pub fn mark_primary(&mut self) -> bool {
        match self {
            LogicalPlan::Table { is_primary, .. } => {
                *is_primary = true;
                true
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Group { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Rename { input, .. }
            | LogicalPlan::Distinct { input }
            | LogicalPlan::Query { input } => input.mark_primary(),
            LogicalPlan::Join { left, .. } | LogicalPlan::Union { left, .. } => {
                left.mark_primary()
            }
            LogicalPlan::Create { .. }
            | LogicalPlan::Insert { .. }
            | LogicalPlan::Cmd { .. }
            | LogicalPlan::FuncDef(_) => false,
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_indent(f, 0)
    }
}

impl LogicalPlan {
    fn format_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            LogicalPlan::Table {
                db,
                table,
                is_primary,
            } => {
                write!(f, "{}Table: {}.{}", pad, db, table)?;
                if *is_primary {
                    write!(f, " (primary)")?;
                }
                writeln!(f)
            }
            LogicalPlan::Filter { input, condition } => {
                writeln!(f, "{}Filter: {}", pad, condition)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Group { input, keys } => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                writeln!(f, "{}Group: [{}]", pad, keys.join(", "))?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Sort { input, order } => {
                writeln!(f, "{}Sort: {}", pad, order)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition,
                ..
            } => {
                write!(f, "{}Join: {}", pad, join_type)?;
                if let Some(cond) = condition {
                    write!(f, " ON {}", cond)?;
                }
                writeln!(f)?;
                left.format_indent(f, indent + 1)?;
                right.format_indent(f, indent + 1)
            }
            LogicalPlan::Union { left, right, all } => {
                writeln!(f, "{}Union{}", pad, if *all { " ALL" } else { "" })?;
                left.format_indent(f, indent + 1)?;
                right.format_indent(f, indent + 1)
            }
            LogicalPlan::Project { input, lists, .. } => {
                for list in lists {
                    let items: Vec<String> = list
                        .items
                        .iter()
                        .map(|i| format!("{} AS {}", i.expr, i.name))
                        .collect();
                    match &list.window {
                        Some(w) => writeln!(f, "{}Project[{}]: [{}]", pad, w.name, items.join(", "))?,
                        None => writeln!(f, "{}Project: [{}]", pad, items.join(", "))?,
                    }
                }
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Limit { input, limit } => {
                writeln!(f, "{}Limit: {}", pad, limit)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Rename { input, alias } => {
                writeln!(f, "{}Rename: {}", pad, alias)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Distinct { input } => {
                writeln!(f, "{}Distinct", pad)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Query { input } => input.format_indent(f, indent),
            LogicalPlan::Create { table } => writeln!(f, "{}Create: {}", pad, table),
            LogicalPlan::Insert { table } => writeln!(f, "{}Insert: {}", pad, table),
            LogicalPlan::Cmd { args } => writeln!(f, "{}Cmd: {}", pad, args.join(" ")),
            LogicalPlan::FuncDef(def) => writeln!(f, "{}FuncDef: {}", pad, def.name),
        }
    }
}
