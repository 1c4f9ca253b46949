//! SQL parser implementation.
//!
//! Converts SQL strings to our internal AST using sqlparser.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::ast::*;
use super::error::{ParseError, ParseResult};

/// SQL parser for SELECT queries.
pub struct Parser;

impl Parser {
    /// Parse a single SELECT statement.
    pub fn parse(sql: &str) -> ParseResult<Select> {
        let sql = sql.trim();
        if sql.is_empty() || sql == ";" {
            return Err(ParseError::EmptyQuery);
        }

        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;

        if statements.is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        if statements.len() > 1 {
            return Err(ParseError::MultipleStatements);
        }

        match &statements[0] {
            sp::Statement::Query(query) => Self::convert_query(query),
            other => Err(ParseError::UnsupportedStatement(format!("{}", other))),
        }
    }

    fn convert_query(query: &sp::Query) -> ParseResult<Select> {
        if query.with.is_some() {
            return Err(ParseError::UnsupportedClause("WITH".into()));
        }
        if query.offset.is_some() {
            return Err(ParseError::UnsupportedClause("OFFSET".into()));
        }

        let select = match query.body.as_ref() {
            sp::SetExpr::Select(s) => s,
            other => {
                return Err(ParseError::UnsupportedStatement(format!(
                    "unsupported query body: {}",
                    other
                )))
            }
        };

        let mut out = Self::convert_select(select)?;

        // ORDER BY
        if let Some(ob) = &query.order_by {
            out.order_by = match &ob.kind {
                sp::OrderByKind::All(_) => {
                    return Err(ParseError::UnsupportedClause("ORDER BY ALL".into()))
                }
                sp::OrderByKind::Expressions(exprs) => exprs
                    .iter()
                    .map(Self::convert_order_by_expr)
                    .collect::<ParseResult<Vec<_>>>()?,
            };
        }

        // LIMIT
        out.limit = match &query.limit {
            Some(l) => Some(Self::expr_to_usize(l).ok_or_else(|| {
                ParseError::UnsupportedExpression(format!("LIMIT {}", l))
            })?),
            None => None,
        };

        Ok(out)
    }

    fn convert_select(select: &sp::Select) -> ParseResult<Select> {
        if select.having.is_some() {
            return Err(ParseError::UnsupportedClause("HAVING".into()));
        }

        let distinct = match &select.distinct {
            None => false,
            Some(sp::Distinct::Distinct) => true,
            Some(sp::Distinct::On(_)) => {
                return Err(ParseError::UnsupportedClause("DISTINCT ON".into()))
            }
        };

        // FROM clause
        if select.from.len() != 1 {
            return Err(ParseError::UnsupportedStatement(
                "exactly one relation in FROM required".into(),
            ));
        }
        let from = Self::convert_table_with_joins(&select.from[0])?;

        // SELECT columns
        let projection = select
            .projection
            .iter()
            .map(Self::convert_select_item)
            .collect::<ParseResult<Vec<_>>>()?;

        // WHERE clause
        let selection = select
            .selection
            .as_ref()
            .map(Self::convert_expr)
            .transpose()?;

        // GROUP BY
        let group_by = match &select.group_by {
            sp::GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(ParseError::UnsupportedClause("GROUP BY modifiers".into()));
                }
                exprs
                    .iter()
                    .map(Self::convert_expr)
                    .collect::<ParseResult<Vec<_>>>()?
            }
            sp::GroupByExpr::All(_) => {
                return Err(ParseError::UnsupportedClause("GROUP BY ALL".into()))
            }
        };

        // WINDOW
        let windows = select
            .named_window
            .iter()
            .map(Self::convert_named_window)
            .collect::<ParseResult<Vec<_>>>()?;

        Ok(Select {
            distinct,
            projection,
            from,
            selection,
            group_by,
            windows,
            order_by: vec![],
            limit: None,
        })
    }

    fn convert_select_item(item: &sp::SelectItem) -> ParseResult<SelectItem> {
        match item {
            sp::SelectItem::Wildcard(_) => Ok(SelectItem {
                expr: Expr::All { relation: None },
                alias: None,
            }),
            sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem {
                expr: Self::convert_expr(expr)?,
                alias: None,
            }),
            sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem {
                expr: Self::convert_expr(expr)?,
                alias: Some(alias.value.clone()),
            }),
            sp::SelectItem::QualifiedWildcard(kind, _) => match kind {
                sp::SelectItemQualifiedWildcardKind::ObjectName(name) => Ok(SelectItem {
                    expr: Expr::All {
                        relation: Some(Self::extract_table_name(name)?),
                    },
                    alias: None,
                }),
                sp::SelectItemQualifiedWildcardKind::Expr(expr) => Err(
                    ParseError::UnsupportedExpression(format!("wildcard over {}", expr)),
                ),
            },
        }
    }

    fn convert_table_with_joins(from: &sp::TableWithJoins) -> ParseResult<TableRef> {
        let mut relation = Self::convert_table_factor(&from.relation)?;
        for join in &from.joins {
            let right = Self::convert_table_factor(&join.relation)?;
            let (kind, constraint) = match &join.join_operator {
                sp::JoinOperator::Inner(c) => (JoinKind::Inner, c),
                sp::JoinOperator::LeftOuter(c) => (JoinKind::LeftOuter, c),
                sp::JoinOperator::RightOuter(c) => (JoinKind::RightOuter, c),
                sp::JoinOperator::FullOuter(c) => (JoinKind::FullOuter, c),
                other => {
                    return Err(ParseError::UnsupportedClause(format!(
                        "join operator {:?}",
                        other
                    )))
                }
            };
            let on = match constraint {
                sp::JoinConstraint::On(expr) => Some(Self::convert_expr(expr)?),
                sp::JoinConstraint::None => None,
                other => {
                    return Err(ParseError::UnsupportedClause(format!(
                        "join constraint {:?}",
                        other
                    )))
                }
            };
            relation = TableRef::Join {
                left: Box::new(relation),
                right: Box::new(right),
                kind,
                on,
            };
        }
        Ok(relation)
    }

    fn convert_table_factor(factor: &sp::TableFactor) -> ParseResult<TableRef> {
        match factor {
            sp::TableFactor::Table { name, alias, .. } => Ok(TableRef::Table {
                name: Self::extract_table_name(name)?,
                alias: alias.as_ref().map(|a| a.name.value.clone()),
            }),
            sp::TableFactor::Derived {
                lateral,
                subquery,
                alias,
                ..
            } => {
                if *lateral {
                    return Err(ParseError::UnsupportedClause("LATERAL".into()));
                }
                Ok(TableRef::Derived {
                    subquery: Box::new(Self::convert_query(subquery)?),
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                })
            }
            other => Err(ParseError::UnsupportedStatement(format!(
                "unsupported FROM clause: {}",
                other
            ))),
        }
    }

    fn convert_order_by_expr(expr: &sp::OrderByExpr) -> ParseResult<OrderByItem> {
        Ok(OrderByItem {
            expr: Self::convert_expr(&expr.expr)?,
            asc: expr.options.asc.unwrap_or(true),
        })
    }

    fn convert_named_window(def: &sp::NamedWindowDefinition) -> ParseResult<NamedWindow> {
        let sp::NamedWindowDefinition(name, window) = def;
        let spec = match window {
            sp::NamedWindowExpr::WindowSpec(spec) => Self::convert_window_spec(spec)?,
            sp::NamedWindowExpr::NamedWindow(other) => {
                return Err(ParseError::UnsupportedClause(format!(
                    "window {} defined as another window {}",
                    name.value, other.value
                )))
            }
        };
        Ok(NamedWindow {
            name: name.value.clone(),
            spec,
        })
    }

    fn convert_window_spec(spec: &sp::WindowSpec) -> ParseResult<WindowSpec> {
        let partition_by = spec
            .partition_by
            .iter()
            .map(Self::convert_expr)
            .collect::<ParseResult<Vec<_>>>()?;
        let order_by = spec
            .order_by
            .iter()
            .map(Self::convert_order_by_expr)
            .collect::<ParseResult<Vec<_>>>()?;
        let frame = spec
            .window_frame
            .as_ref()
            .map(Self::convert_window_frame)
            .transpose()?;
        Ok(WindowSpec {
            partition_by,
            order_by,
            frame,
        })
    }

    fn convert_window_frame(frame: &sp::WindowFrame) -> ParseResult<WindowFrame> {
        let units = match frame.units {
            sp::WindowFrameUnits::Rows => FrameUnits::Rows,
            sp::WindowFrameUnits::Range => FrameUnits::Range,
            sp::WindowFrameUnits::Groups => {
                return Err(ParseError::UnsupportedClause("GROUPS frame".into()))
            }
        };
        let start = Self::convert_frame_bound(&frame.start_bound, true)?;
        let end = match &frame.end_bound {
            Some(bound) => Self::convert_frame_bound(bound, false)?,
            None => FrameBound::CurrentRow,
        };
        Ok(WindowFrame { units, start, end })
    }

    fn convert_frame_bound(bound: &sp::WindowFrameBound, is_start: bool) -> ParseResult<FrameBound> {
        match bound {
            sp::WindowFrameBound::CurrentRow => Ok(FrameBound::CurrentRow),
            sp::WindowFrameBound::Preceding(None) => Ok(FrameBound::UnboundedPreceding),
            sp::WindowFrameBound::Following(None) => Ok(FrameBound::UnboundedFollowing),
            sp::WindowFrameBound::Preceding(Some(e)) => Self::frame_offset(e, is_start)
                .map(FrameBound::Preceding),
            sp::WindowFrameBound::Following(Some(e)) => Self::frame_offset(e, is_start)
                .map(FrameBound::Following),
        }
    }

    fn frame_offset(expr: &sp::Expr, is_start: bool) -> ParseResult<u64> {
        Self::expr_to_usize(expr)
            .map(|n| n as u64)
            .ok_or_else(|| {
                let side = if is_start { "start" } else { "end" };
                ParseError::UnsupportedExpression(format!("frame {} offset {}", side, expr))
            })
    }

    fn convert_expr(expr: &sp::Expr) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(id) => Ok(Expr::column(id.value.clone())),

            sp::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [relation, column] => Ok(Expr::qualified(
                    relation.value.clone(),
                    column.value.clone(),
                )),
                [_db, relation, column] => Ok(Expr::qualified(
                    relation.value.clone(),
                    column.value.clone(),
                )),
                _ => Err(ParseError::InvalidIdentifier(
                    parts
                        .iter()
                        .map(|p| p.value.as_str())
                        .collect::<Vec<_>>()
                        .join("."),
                )),
            },

            sp::Expr::Value(v) => Ok(Expr::Literal(Self::convert_value(v)?)),

            sp::Expr::BinaryOp { left, op, right } => {
                let l = Self::convert_expr(left)?;
                let r = Self::convert_expr(right)?;
                let o = Self::convert_binary_op(op)?;
                Ok(Expr::binary(l, o, r))
            }

            sp::Expr::UnaryOp { op, expr } => {
                let e = Self::convert_expr(expr)?;
                let o = Self::convert_unary_op(op)?;
                Ok(Expr::UnaryOp {
                    op: o,
                    expr: Box::new(e),
                })
            }

            sp::Expr::IsNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: false,
            }),

            sp::Expr::IsNotNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: true,
            }),

            sp::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let e = Self::convert_expr(expr)?;
                let items = list
                    .iter()
                    .map(Self::convert_expr)
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Expr::InList {
                    expr: Box::new(e),
                    list: items,
                    negated: *negated,
                })
            }

            sp::Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Ok(Expr::Between {
                expr: Box::new(Self::convert_expr(expr)?),
                low: Box::new(Self::convert_expr(low)?),
                high: Box::new(Self::convert_expr(high)?),
                negated: *negated,
            }),

            sp::Expr::Function(f) => Self::convert_function(f),

            sp::Expr::Nested(inner) => Ok(Expr::Nested(Box::new(Self::convert_expr(inner)?))),

            other => Err(ParseError::UnsupportedExpression(format!("{}", other))),
        }
    }

    fn convert_function(f: &sp::Function) -> ParseResult<Expr> {
        let name = f.name.to_string();
        let args = match &f.args {
            sp::FunctionArguments::List(list) => list
                .args
                .iter()
                .map(|arg| match arg {
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => {
                        Self::convert_expr(e)
                    }
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => {
                        Ok(Expr::All { relation: None })
                    }
                    other => Err(ParseError::UnsupportedExpression(format!(
                        "function argument {}",
                        other
                    ))),
                })
                .collect::<ParseResult<Vec<_>>>()?,
            sp::FunctionArguments::None => vec![],
            sp::FunctionArguments::Subquery(_) => {
                return Err(ParseError::UnsupportedExpression(format!(
                    "subquery argument to {}",
                    name
                )))
            }
        };
        let over = match &f.over {
            None => None,
            Some(sp::WindowType::NamedWindow(ident)) => Some(Over::Named(ident.value.clone())),
            Some(sp::WindowType::WindowSpec(spec)) => {
                Some(Over::Spec(Box::new(Self::convert_window_spec(spec)?)))
            }
        };
        Ok(Expr::Function { name, args, over })
    }

    fn convert_value(v: &sp::ValueWithSpan) -> ParseResult<Literal> {
        match &v.value {
            sp::Value::Null => Ok(Literal::Null),
            sp::Value::Boolean(b) => Ok(Literal::Bool(*b)),
            sp::Value::Number(s, _) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(Literal::Int(i))
                } else if let Ok(f) = s.parse::<f64>() {
                    Ok(Literal::Float(f))
                } else {
                    Err(ParseError::UnsupportedExpression(format!("invalid number: {}", s)))
                }
            }
            sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => {
                Ok(Literal::String(s.clone()))
            }
            other => Err(ParseError::UnsupportedExpression(format!(
                "unsupported value: {}",
                other
            ))),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOperator> {
        match op {
            sp::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sp::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sp::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sp::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sp::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sp::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sp::BinaryOperator::And => Ok(BinaryOperator::And),
            sp::BinaryOperator::Or => Ok(BinaryOperator::Or),
            sp::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
            sp::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
            sp::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
            sp::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
            sp::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
            sp::BinaryOperator::StringConcat => Ok(BinaryOperator::Concat),
            other => Err(ParseError::UnsupportedExpression(format!(
                "unsupported operator: {}",
                other
            ))),
        }
    }

    fn convert_unary_op(op: &sp::UnaryOperator) -> ParseResult<UnaryOperator> {
        match op {
            sp::UnaryOperator::Not => Ok(UnaryOperator::Not),
            sp::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
            sp::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
            other => Err(ParseError::UnsupportedExpression(format!(
                "unsupported unary operator: {}",
                other
            ))),
        }
    }

    fn extract_table_name(name: &sp::ObjectName) -> ParseResult<String> {
        // Use just the table name, ignoring schema
        name.0
            .last()
            .map(|i| {
                i.as_ident()
                    .map(|id| id.value.clone())
                    .unwrap_or_else(|| i.to_string())
            })
            .ok_or_else(|| ParseError::InvalidIdentifier("empty table name".into()))
    }

    fn expr_to_usize(expr: &sp::Expr) -> Option<usize> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::Number(s, _) => s.parse().ok(),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_by() {
        let select = Parser::parse("SELECT sum(col1) as col1sum FROM t1 group by col1, col2;").unwrap();

        assert_eq!(
            select.from,
            TableRef::Table {
                name: "t1".into(),
                alias: None
            }
        );
        assert_eq!(select.projection.len(), 1);
        assert_eq!(select.projection[0].alias.as_deref(), Some("col1sum"));
        assert_eq!(select.projection[0].expr.to_string(), "sum(col1)");
        assert_eq!(select.group_by, vec![Expr::column("col1"), Expr::column("col2")]);
    }

    #[test]
    fn test_parse_named_window() {
        let sql = "SELECT col1, sum(col3) OVER w1 as w1_col3_sum FROM t1 \
                   WINDOW w1 AS (PARTITION BY col1 ORDER BY col5 \
                   RANGE BETWEEN 3 PRECEDING AND CURRENT ROW) limit 10;";
        let select = Parser::parse(sql).unwrap();

        assert_eq!(select.limit, Some(10));
        assert_eq!(select.windows.len(), 1);
        let w1 = &select.windows[0];
        assert_eq!(w1.name, "w1");
        assert_eq!(w1.spec.partition_by, vec![Expr::column("col1")]);
        assert_eq!(w1.spec.order_by[0].expr, Expr::column("col5"));
        assert!(w1.spec.order_by[0].asc);
        assert_eq!(
            w1.spec.frame,
            Some(WindowFrame {
                units: FrameUnits::Range,
                start: FrameBound::Preceding(3),
                end: FrameBound::CurrentRow,
            })
        );
        assert!(matches!(
            select.projection[1].expr.window(),
            Some(Over::Named(name)) if name == "w1"
        ));
    }

    #[test]
    fn test_parse_inline_window() {
        let sql = "SELECT max(col2) OVER (PARTITION BY col1 ORDER BY col5 \
                   ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) FROM t1";
        let select = Parser::parse(sql).unwrap();
        match select.projection[0].expr.window() {
            Some(Over::Spec(spec)) => {
                let frame = spec.frame.unwrap();
                assert_eq!(frame.units, FrameUnits::Rows);
                assert_eq!(frame.start, FrameBound::UnboundedPreceding);
            }
            other => panic!("Expected inline window, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_join() {
        let sql = "SELECT t1.col1, t2.col2 FROM t1 LEFT OUTER JOIN t2 ON t1.col1 = t2.col1";
        let select = Parser::parse(sql).unwrap();
        match select.from {
            TableRef::Join { kind, on, .. } => {
                assert_eq!(kind, JoinKind::LeftOuter);
                assert_eq!(on.unwrap().to_string(), "t1.col1 = t2.col1");
            }
            other => panic!("Expected Join, got {:?}", other),
        }
        assert_eq!(select.projection[0].expr, Expr::qualified("t1", "col1"));
    }

    #[test]
    fn test_parse_derived_table() {
        let sql = "SELECT sum(col1) FROM (select c1 as col1, c2 as col2 from tc) group by col2";
        let select = Parser::parse(sql).unwrap();
        match select.from {
            TableRef::Derived { subquery, alias } => {
                assert!(alias.is_none());
                assert_eq!(subquery.projection.len(), 2);
                assert_eq!(subquery.projection[1].output_name(), "col2");
            }
            other => panic!("Expected Derived, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_select_where_order_limit() {
        let sql = "SELECT * FROM users WHERE age > 21 ORDER BY name DESC LIMIT 5";
        let select = Parser::parse(sql).unwrap();
        assert_eq!(select.projection[0].expr, Expr::All { relation: None });
        assert_eq!(select.selection.unwrap().to_string(), "age > 21");
        assert!(!select.order_by[0].asc);
        assert_eq!(select.limit, Some(5));
    }

    #[test]
    fn test_parse_count_star_and_distinct() {
        let select = Parser::parse("SELECT DISTINCT count(*) FROM t1").unwrap();
        assert!(select.distinct);
        assert_eq!(select.projection[0].expr.to_string(), "count(*)");
        assert!(select.projection[0].expr.contains_aggregate());
    }

    #[test]
    fn test_unsupported_clauses() {
        assert!(matches!(
            Parser::parse("SELECT col1 FROM t1 GROUP BY col1 HAVING col1 > 1"),
            Err(ParseError::UnsupportedClause(_))
        ));
        assert!(matches!(
            Parser::parse("INSERT INTO t1 VALUES (1)"),
            Err(ParseError::UnsupportedStatement(_))
        ));
        assert!(matches!(
            Parser::parse("SELECT 1 FROM t1; SELECT 2 FROM t1"),
            Err(ParseError::MultipleStatements)
        ));
        assert!(matches!(Parser::parse("SELEC"), Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_parse_qualified_wildcard() {
        let select =
            Parser::parse("SELECT t1.*, t2.col2 FROM t1 JOIN t2 ON t1.col1 = t2.col1").unwrap();
        assert_eq!(
            select.projection[0].expr,
            Expr::All {
                relation: Some("t1".into())
            }
        );
        assert_eq!(select.projection[1].expr, Expr::qualified("t2", "col2"));
    }

    #[test]
    fn test_empty_query() {
        assert!(matches!(Parser::parse("").unwrap_err(), ParseError::EmptyQuery));
        assert!(matches!(Parser::parse("   ").unwrap_err(), ParseError::EmptyQuery));
    }
}
