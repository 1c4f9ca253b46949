//! Query planner - converts SQL AST to logical plans.
//!
//! The SELECT list is split into project lists: one per window referenced by
//! the query, or a single row-wise list when no window is used. Items that do
//! not use a window join the first window's list. The position map records
//! where every SELECT item landed so the physical plan can restore the
//! original column order.

use tracing::debug;

use super::error::{PlanError, PlanResult};
use super::logical::{JoinType, LogicalPlan, OrderBy, ProjectItem, ProjectList, WindowDef};
use crate::sql::{JoinKind, OrderByItem, Over, Parser, Select, TableRef, WindowSpec};

/// The query planner.
pub struct QueryPlanner {
    db: String,
    request_mode: bool,
}

impl QueryPlanner {
    /// Create a planner resolving unqualified tables in `db`.
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            request_mode: false,
        }
    }

    /// Plan for request mode, marking the primary table.
    pub fn with_request_mode(mut self, enabled: bool) -> Self {
        self.request_mode = enabled;
        self
    }

    /// Parse and plan a SQL query.
    pub fn plan_sql(&self, sql: &str) -> PlanResult<LogicalPlan> {
        let select = Parser::parse(sql)?;
        self.plan_query(&select)
    }

    /// Create the logical plan of a top-level query.
    pub fn plan_query(&self, select: &Select) -> PlanResult<LogicalPlan> {
        let mut plan = self.plan_select(select)?;
        if self.request_mode && !plan.mark_primary() {
            return Err(PlanError::Plan(
                "request mode requires a primary table".into(),
            ));
        }
        debug!(request_mode = self.request_mode, "planned query");
        Ok(plan.query())
    }

    /// Create a logical plan for a SELECT statement.
    pub fn plan_select(&self, select: &Select) -> PlanResult<LogicalPlan> {
        // Start with the FROM clause.
        let mut plan = self.plan_from(&select.from)?;

        // Add WHERE filter.
        if let Some(condition) = &select.selection {
            plan = plan.filter(condition.clone());
        }

        // Add GROUP BY.
        if !select.group_by.is_empty() {
            plan = plan.group(select.group_by.clone());
        }

        // Projection.
        let (lists, pos_mapping) = self.plan_projection(select)?;
        plan = LogicalPlan::Project {
            input: Box::new(plan),
            lists,
            pos_mapping,
        };

        if select.distinct {
            plan = plan.distinct();
        }

        // Add ORDER BY.
        if let Some(order) = Self::convert_order_by(&select.order_by) {
            plan = plan.sort(order);
        }

        // Add LIMIT.
        if let Some(limit) = select.limit {
            plan = plan.limit(limit);
        }

        Ok(plan)
    }

    fn plan_from(&self, from: &TableRef) -> PlanResult<LogicalPlan> {
        match from {
            TableRef::Table { name, alias } => {
                let plan = LogicalPlan::table(self.db.clone(), name.clone());
                Ok(match alias {
                    Some(alias) => plan.rename(alias.clone()),
                    None => plan,
                })
            }
            TableRef::Derived { subquery, alias } => {
                let plan = self.plan_select(subquery)?;
                Ok(match alias {
                    Some(alias) => plan.rename(alias.clone()),
                    None => plan,
                })
            }
            TableRef::Join {
                left,
                right,
                kind,
                on,
            } => {
                let join_type = match (kind, on) {
                    (JoinKind::Inner, None) => JoinType::Cross,
                    (JoinKind::Inner, Some(_)) => JoinType::Inner,
                    (JoinKind::LeftOuter, _) => JoinType::Left,
                    (JoinKind::RightOuter, _) => JoinType::Right,
                    (JoinKind::FullOuter, _) => JoinType::Full,
                };
                let left = self.plan_from(left)?;
                let right = self.plan_from(right)?;
                Ok(left.join(right, join_type, on.clone()))
            }
        }
    }

    /// Split the SELECT list into project lists and record the position map.
    fn plan_projection(
        &self,
        select: &Select,
    ) -> PlanResult<(Vec<ProjectList>, Vec<(usize, usize)>)> {
        let windows = select
            .projection
            .iter()
            .map(|item| {
                item.expr
                    .window()
                    .map(|over| self.resolve_window(over, select))
                    .transpose()
            })
            .collect::<PlanResult<Vec<_>>>()?;

        let mut lists: Vec<ProjectList> = Vec::new();
        for window in windows.iter().flatten() {
            if !lists.iter().any(|l| l.window.as_ref() == Some(window)) {
                lists.push(ProjectList::windowed(window.clone(), vec![]));
            }
        }

        if lists.is_empty() {
            lists.push(ProjectList::new(vec![]));
        } else if !select.group_by.is_empty() {
            return Err(PlanError::Unsupported(
                "window functions combined with GROUP BY".into(),
            ));
        }

        let mut pos_mapping = Vec::with_capacity(select.projection.len());
        for (item, window) in select.projection.iter().zip(&windows) {
            let list_idx = match window {
                Some(w) => lists
                    .iter()
                    .position(|l| l.window.as_ref() == Some(w))
                    .unwrap_or(0),
                None => 0,
            };
            let list = &mut lists[list_idx];
            list.items
                .push(ProjectItem::new(item.output_name(), item.expr.clone()));
            pos_mapping.push((list_idx, list.items.len() - 1));
        }

        Ok((lists, pos_mapping))
    }

    fn resolve_window(&self, over: &Over, select: &Select) -> PlanResult<WindowDef> {
        match over {
            Over::Named(name) => select
                .windows
                .iter()
                .find(|w| &w.name == name)
                .map(|w| Self::window_def(&w.name, &w.spec))
                .ok_or_else(|| PlanError::UndefinedWindow(name.clone())),
            Over::Spec(spec) => Ok(Self::window_def(&spec.to_string(), spec)),
        }
    }

    fn window_def(name: &str, spec: &WindowSpec) -> WindowDef {
        WindowDef {
            name: name.to_string(),
            partition_by: spec.partition_by.clone(),
            order_by: Self::convert_order_by(&spec.order_by),
            frame: spec.frame,
            union_tables: vec![],
        }
    }

    /// The first item decides the direction of the whole key list.
    fn convert_order_by(items: &[OrderByItem]) -> Option<OrderBy> {
        let first = items.first()?;
        Some(OrderBy::new(
            items.iter().map(|i| i.expr.clone()).collect(),
            first.asc,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Expr, FrameBound};

    fn planner() -> QueryPlanner {
        QueryPlanner::new("db")
    }

    fn unwrap_query(plan: LogicalPlan) -> LogicalPlan {
        match plan {
            LogicalPlan::Query { input } => *input,
            other => panic!("Expected Query, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_group_by() {
        let plan = planner()
            .plan_sql("SELECT sum(col1) as col1sum FROM t1 group by col1;")
            .unwrap();
        match unwrap_query(plan) {
            LogicalPlan::Project {
                input,
                lists,
                pos_mapping,
            } => {
                assert_eq!(lists.len(), 1);
                assert!(lists[0].window.is_none());
                assert_eq!(lists[0].items[0].name, "col1sum");
                assert!(lists[0].items[0].is_aggregation);
                assert_eq!(pos_mapping, vec![(0, 0)]);
                assert_eq!(
                    *input,
                    LogicalPlan::table("db", "t1").group(vec![Expr::column("col1")])
                );
            }
            other => panic!("Expected Project, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_window_shares_list() {
        let sql = "SELECT col1, sum(col3) OVER w1 as s3, sum(col2) OVER w1 as s2 FROM t1 \
                   WINDOW w1 AS (PARTITION BY col1 ORDER BY col5 \
                   RANGE BETWEEN 3 PRECEDING AND CURRENT ROW) limit 10;";
        let plan = unwrap_query(planner().plan_sql(sql).unwrap());
        let LogicalPlan::Limit { input, limit } = plan else {
            panic!("Expected Limit");
        };
        assert_eq!(limit, 10);
        match *input {
            LogicalPlan::Project {
                lists, pos_mapping, ..
            } => {
                assert_eq!(lists.len(), 1);
                let window = lists[0].window.as_ref().unwrap();
                assert_eq!(window.name, "w1");
                assert_eq!(window.partition_by, vec![Expr::column("col1")]);
                assert_eq!(window.order_by, Some(OrderBy::asc(Expr::column("col5"))));
                assert_eq!(window.frame.unwrap().start, FrameBound::Preceding(3));
                assert!(lists[0].is_window_agg);
                assert_eq!(pos_mapping, vec![(0, 0), (0, 1), (0, 2)]);
            }
            other => panic!("Expected Project, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_multiple_windows() {
        let sql = "SELECT sum(col1) OVER w1 as a, col0, sum(col2) OVER w2 as b FROM t1 \
                   WINDOW w1 AS (PARTITION BY col1 ORDER BY col5 ROWS BETWEEN 2 PRECEDING AND CURRENT ROW), \
                   w2 AS (PARTITION BY col2 ORDER BY col5 ROWS BETWEEN 2 PRECEDING AND CURRENT ROW)";
        match unwrap_query(planner().plan_sql(sql).unwrap()) {
            LogicalPlan::Project {
                lists, pos_mapping, ..
            } => {
                assert_eq!(lists.len(), 2);
                assert_eq!(lists[0].items.len(), 2);
                assert_eq!(lists[1].items.len(), 1);
                assert_eq!(pos_mapping, vec![(0, 0), (0, 1), (1, 0)]);
            }
            other => panic!("Expected Project, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_undefined_window() {
        let result = planner().plan_sql("SELECT sum(col1) OVER nope FROM t1");
        assert!(matches!(result, Err(PlanError::UndefinedWindow(w)) if w == "nope"));
    }

    #[test]
    fn test_plan_window_with_group_by_rejected() {
        let sql = "SELECT sum(col1) OVER (PARTITION BY col2) FROM t1 GROUP BY col2";
        assert!(matches!(
            planner().plan_sql(sql),
            Err(PlanError::Unsupported(_))
        ));
    }

    #[test]
    fn test_plan_join_and_alias() {
        let sql = "SELECT a.col1 FROM t1 a LEFT OUTER JOIN t2 ON a.col1 = t2.col1";
        match unwrap_query(planner().plan_sql(sql).unwrap()) {
            LogicalPlan::Project { input, .. } => match *input {
                LogicalPlan::Join {
                    left, join_type, ..
                } => {
                    assert_eq!(join_type, JoinType::Left);
                    assert_eq!(*left, LogicalPlan::table("db", "t1").rename("a"));
                }
                other => panic!("Expected Join, got {:?}", other),
            },
            other => panic!("Expected Project, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_request_mode_marks_primary() {
        let plan = QueryPlanner::new("db")
            .with_request_mode(true)
            .plan_sql("SELECT col1 FROM t1 WHERE col1 > 3")
            .unwrap();
        match unwrap_query(plan) {
            LogicalPlan::Project { input, .. } => match *input {
                LogicalPlan::Filter { input, .. } => {
                    assert!(matches!(*input, LogicalPlan::Table { is_primary: true, .. }));
                }
                other => panic!("Expected Filter, got {:?}", other),
            },
            other => panic!("Expected Project, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_order_and_distinct() {
        let plan = unwrap_query(
            planner()
                .plan_sql("SELECT DISTINCT col1 FROM t1 ORDER BY col1 DESC")
                .unwrap(),
        );
        match plan {
            LogicalPlan::Sort { input, order } => {
                assert!(!order.ascending);
                assert!(matches!(*input, LogicalPlan::Distinct { .. }));
            }
            other => panic!("Expected Sort, got {:?}", other),
        }
    }
}
