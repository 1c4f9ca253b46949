//! Memo key for logical plan nodes.

use crate::planner::LogicalPlan;

/// Borrowed logical node compared and hashed by structure.
///
/// Two keys are equal when their subtrees are deeply equal, so identical
/// subtrees written twice in a query compile to one physical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalOpKey<'a>(pub &'a LogicalPlan);

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::sql::Expr;

    #[test]
    fn test_structural_key() {
        let a = LogicalPlan::table("db", "t1").filter(Expr::column("col1"));
        let b = LogicalPlan::table("db", "t1").filter(Expr::column("col1"));
        let c = LogicalPlan::table("db", "t2").filter(Expr::column("col1"));

        let mut memo = HashMap::new();
        memo.insert(LogicalOpKey(&a), 1);
        assert_eq!(memo.get(&LogicalOpKey(&b)), Some(&1));
        assert_eq!(memo.get(&LogicalOpKey(&c)), None);
    }
}
