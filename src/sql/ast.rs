//! Internal AST types for SQL queries.
//!
//! These types are simplified representations of the SELECT statements the
//! query planner understands. Expressions are shared with the logical and
//! physical plans, so they implement structural `Eq` and `Hash`.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Aggregate functions known to the planner, lower case.
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "distinct_count",
    "first_value",
];

/// SELECT statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: TableRef,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    /// Windows declared in the WINDOW clause.
    pub windows: Vec<NamedWindow>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<usize>,
}

/// An item in the SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    /// Output column name: the alias, or a name derived from the expression.
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.expr.default_name())
    }
}

/// A relation in the FROM clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableRef {
    /// Named table with optional alias.
    Table { name: String, alias: Option<String> },
    /// Subquery in FROM.
    Derived {
        subquery: Box<Select>,
        alias: Option<String>,
    },
    /// Two relations joined together.
    Join {
        left: Box<TableRef>,
        right: Box<TableRef>,
        kind: JoinKind,
        on: Option<Expr>,
    },
}

/// Join kinds accepted in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

/// ORDER BY clause item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderByItem {
    pub expr: Expr,
    pub asc: bool,
}

/// `WINDOW name AS (...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedWindow {
    pub name: String,
    pub spec: WindowSpec,
}

/// Body of a window definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub frame: Option<WindowFrame>,
}

/// Window reference on a function call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Over {
    /// `OVER w1`
    Named(String),
    /// `OVER (PARTITION BY ...)`
    Spec(Box<WindowSpec>),
}

/// Window frame clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: FrameBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameUnits {
    Rows,
    Range,
}

/// One end of a window frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    /// Signed offset relative to the current row, `None` when unbounded.
    pub fn offset(&self) -> Option<i64> {
        match self {
            FrameBound::UnboundedPreceding | FrameBound::UnboundedFollowing => None,
            FrameBound::Preceding(n) => Some(-(*n as i64)),
            FrameBound::CurrentRow => Some(0),
            FrameBound::Following(n) => Some(*n as i64),
        }
    }
}

impl fmt::Display for FrameBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameBound::UnboundedPreceding => write!(f, "UNBOUNDED PRECEDING"),
            FrameBound::Preceding(n) => write!(f, "{} PRECEDING", n),
            FrameBound::CurrentRow => write!(f, "CURRENT ROW"),
            FrameBound::Following(n) => write!(f, "{} FOLLOWING", n),
            FrameBound::UnboundedFollowing => write!(f, "UNBOUNDED FOLLOWING"),
        }
    }
}

/// Column reference with optional relation qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub relation: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            relation: None,
            name: name.into(),
        }
    }

    pub fn qualified(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}.{}", relation, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// SQL expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Column reference.
    Column(ColumnRef),
    /// `*` or `relation.*`.
    All { relation: Option<String> },
    /// Literal value.
    Literal(Literal),
    /// Binary operation (e.g., a = b, a AND b).
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation (e.g., NOT a, -x).
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Function call, possibly evaluated over a window.
    Function {
        name: String,
        args: Vec<Expr>,
        over: Option<Over>,
    },
    /// IS NULL / IS NOT NULL.
    IsNull { expr: Box<Expr>, negated: bool },
    /// BETWEEN a AND b.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// IN list.
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// Nested expression in parentheses.
    Nested(Box<Expr>),
}

impl Expr {
    /// Unqualified column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    /// Qualified column reference.
    pub fn qualified(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::qualified(relation, name))
    }

    /// Call of `name` with `args`.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
            over: None,
        }
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// The column this expression refers to, if it is a bare column reference.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(col) => Some(col),
            Expr::Nested(inner) => inner.as_column(),
            _ => None,
        }
    }

    /// Check whether this expression contains an aggregate call that is not
    /// evaluated over a window.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function { name, args, over } => {
                (over.is_none() && is_aggregate_function(name))
                    || args.iter().any(Expr::contains_aggregate)
            }
            other => other.children().iter().any(|e| e.contains_aggregate()),
        }
    }

    /// The first window referenced by a function call in this expression.
    pub fn window(&self) -> Option<&Over> {
        match self {
            Expr::Function { over: Some(over), .. } => Some(over),
            Expr::Function { args, .. } => args.iter().find_map(Expr::window),
            other => other.children().into_iter().find_map(Expr::window),
        }
    }

    /// Output name used when the expression has no alias.
    pub fn default_name(&self) -> String {
        match self {
            Expr::Column(col) => col.name.clone(),
            other => other.to_string(),
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::All { .. } | Expr::Literal(_) => vec![],
            Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::Nested(expr) => {
                vec![expr.as_ref()]
            }
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Between { expr, low, high, .. } => {
                vec![expr.as_ref(), low.as_ref(), high.as_ref()]
            }
            Expr::InList { expr, list, .. } => {
                let mut out: Vec<&Expr> = vec![expr.as_ref()];
                out.extend(list.iter());
                out
            }
        }
    }
}

/// Check whether `name` is a builtin aggregate function.
pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str())
}

/// Literal value.
#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

// Floats compare by bit pattern so literals can key hash maps.
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Null, Literal::Null) => true,
            (Literal::Bool(a), Literal::Bool(b)) => a == b,
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::String(a), Literal::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Null => {}
            Literal::Bool(b) => b.hash(state),
            Literal::Int(i) => i.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "'{}'", s),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // String
    Concat,
}

impl BinaryOperator {
    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    /// Check if this is a logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::All { relation: Some(r) } => write!(f, "{}.*", r),
            Expr::All { relation: None } => write!(f, "*"),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::BinaryOp { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => write!(f, "NOT {}", expr),
                UnaryOperator::Minus => write!(f, "-{}", expr),
                UnaryOperator::Plus => write!(f, "+{}", expr),
            },
            Expr::Function { name, args, over } => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")?;
                match over {
                    Some(Over::Named(w)) => write!(f, " OVER {}", w),
                    Some(Over::Spec(spec)) => write!(f, " OVER ({})", spec),
                    None => Ok(()),
                }
            }
            Expr::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{} IS{} NULL", expr, not)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{}{} BETWEEN {} AND {}", expr, not, low, high)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{}{} IN (", expr, not)?;
                write_list(f, list)?;
                write!(f, ")")
            }
            Expr::Nested(inner) => write!(f, "({})", inner),
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY ")?;
            write_list(f, &self.partition_by)?;
            sep = " ";
        }
        if !self.order_by.is_empty() {
            write!(f, "{}ORDER BY ", sep)?;
            for (i, item) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}{}", item.expr, if item.asc { "" } else { " DESC" })?;
            }
            sep = " ";
        }
        if let Some(frame) = &self.frame {
            let units = match frame.units {
                FrameUnits::Rows => "ROWS",
                FrameUnits::Range => "RANGE",
            };
            write!(f, "{}{} BETWEEN {} AND {}", sep, units, frame.start, frame.end)?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}
