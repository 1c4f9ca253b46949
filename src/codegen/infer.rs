//! Reference expression compiler that only infers output schemas.

use std::collections::HashMap;

use tracing::trace;

use super::error::{CodegenError, CodegenResult};
use super::{ExprCompiler, FnInfo};
use crate::catalog::DataType;
use crate::physical::{Column, Schema};
use crate::planner::FnDef;
use crate::sql::{is_aggregate_function, BinaryOperator, Expr, Literal, UnaryOperator};

/// Prefix of every generated function name.
pub const FN_NAME_PREFIX: &str = "__internal_sql_codegen_";

/// Resolves columns and infers result types without generating code.
#[derive(Debug, Default)]
pub struct SchemaInferCompiler {
    next_id: usize,
    functions: HashMap<String, FnDef>,
}

impl SchemaInferCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of functions compiled so far.
    pub fn compiled_count(&self) -> usize {
        self.next_id
    }

    fn infer(&self, input: &Schema, expr: &Expr, row_mode: bool) -> CodegenResult<DataType> {
        match expr {
            Expr::Column(col) => input
                .resolve(col)
                .and_then(|pos| input.column(pos))
                .map(|c| c.data_type)
                .ok_or_else(|| CodegenError::UnknownColumn(col.to_string())),

            Expr::All { .. } => Err(CodegenError::TypeMismatch(
                "* is only valid as a select item or count argument".into(),
            )),

            Expr::Literal(lit) => Ok(match lit {
                Literal::Null => DataType::Null,
                Literal::Bool(_) => DataType::Bool,
                Literal::Int(v) if i32::try_from(*v).is_ok() => DataType::Int32,
                Literal::Int(_) => DataType::Int64,
                Literal::Float(_) => DataType::Double,
                Literal::String(_) => DataType::String,
            }),

            Expr::BinaryOp { left, op, right } => {
                let l = self.infer(input, left, row_mode)?;
                let r = self.infer(input, right, row_mode)?;
                infer_binary(l, *op, r).ok_or_else(|| {
                    CodegenError::TypeMismatch(format!("{} {} {}", l, op.symbol(), r))
                })
            }

            Expr::UnaryOp { op, expr } => {
                let t = self.infer(input, expr, row_mode)?;
                match op {
                    UnaryOperator::Not => Ok(DataType::Bool),
                    UnaryOperator::Minus | UnaryOperator::Plus
                        if t.is_numeric() || t == DataType::Null =>
                    {
                        Ok(t)
                    }
                    _ => Err(CodegenError::TypeMismatch(format!("-{}", t))),
                }
            }

            Expr::IsNull { expr, .. } => {
                self.infer(input, expr, row_mode)?;
                Ok(DataType::Bool)
            }

            Expr::Between {
                expr, low, high, ..
            } => {
                for e in [expr, low, high] {
                    self.infer(input, e, row_mode)?;
                }
                Ok(DataType::Bool)
            }

            Expr::InList { expr, list, .. } => {
                self.infer(input, expr, row_mode)?;
                for e in list {
                    self.infer(input, e, row_mode)?;
                }
                Ok(DataType::Bool)
            }

            Expr::Function { name, args, .. } => self.infer_call(input, name, args, row_mode),

            Expr::Nested(inner) => self.infer(input, inner, row_mode),
        }
    }

    fn infer_call(
        &self,
        input: &Schema,
        name: &str,
        args: &[Expr],
        row_mode: bool,
    ) -> CodegenResult<DataType> {
        let lower = name.to_ascii_lowercase();

        if let Some(def) = self.functions.get(&lower) {
            if def.args.len() != args.len() {
                return Err(CodegenError::TypeMismatch(format!(
                    "{} expects {} arguments, got {}",
                    def.name,
                    def.args.len(),
                    args.len()
                )));
            }
            for arg in args {
                self.infer(input, arg, row_mode)?;
            }
            return Ok(def.return_type);
        }

        if is_aggregate_function(&lower) {
            if row_mode {
                return Err(CodegenError::AggregateInRowMode(lower));
            }
            return match lower.as_str() {
                "count" | "distinct_count" => {
                    for arg in args.iter().filter(|a| !matches!(a, Expr::All { .. })) {
                        self.infer(input, arg, row_mode)?;
                    }
                    Ok(DataType::Int64)
                }
                "avg" => {
                    let t = self.single_arg(input, &lower, args, row_mode)?;
                    numeric_or_mismatch(&lower, t).map(|_| DataType::Double)
                }
                "sum" => {
                    let t = self.single_arg(input, &lower, args, row_mode)?;
                    numeric_or_mismatch(&lower, t)
                }
                // min, max, first_value
                _ => self.single_arg(input, &lower, args, row_mode),
            };
        }

        let arg_types = args
            .iter()
            .map(|a| self.infer(input, a, row_mode))
            .collect::<CodegenResult<Vec<_>>>()?;
        match lower.as_str() {
            "abs" => match arg_types.as_slice() {
                [t] => numeric_or_mismatch(&lower, *t),
                _ => Err(arity_mismatch(&lower, 1, arg_types.len())),
            },
            "lower" | "upper" | "substr" | "concat" => Ok(DataType::String),
            "year" | "month" | "day" | "hour" | "minute" => Ok(DataType::Int32),
            _ => Err(CodegenError::UnknownFunction(name.to_string())),
        }
    }

    fn single_arg(
        &self,
        input: &Schema,
        name: &str,
        args: &[Expr],
        row_mode: bool,
    ) -> CodegenResult<DataType> {
        match args {
            [arg] => self.infer(input, arg, row_mode),
            _ => Err(arity_mismatch(name, 1, args.len())),
        }
    }
}

fn infer_binary(l: DataType, op: BinaryOperator, r: DataType) -> Option<DataType> {
    if op.is_comparison() || op.is_logical() {
        return Some(DataType::Bool);
    }
    match op {
        BinaryOperator::Concat => Some(DataType::String),
        BinaryOperator::Divide if (l.is_numeric() || l == DataType::Null) && (r.is_numeric() || r == DataType::Null) => {
            Some(DataType::Double)
        }
        BinaryOperator::Plus | BinaryOperator::Minus
            if l == DataType::Timestamp && matches!(r, DataType::Int16 | DataType::Int32 | DataType::Int64) =>
        {
            Some(DataType::Timestamp)
        }
        _ if l == DataType::Null && r.is_numeric() => Some(r),
        _ if r == DataType::Null && l.is_numeric() => Some(l),
        _ => l.promote(r),
    }
}

fn numeric_or_mismatch(name: &str, t: DataType) -> CodegenResult<DataType> {
    if t.is_numeric() {
        Ok(t)
    } else {
        Err(CodegenError::TypeMismatch(format!("{}({})", name, t)))
    }
}

fn arity_mismatch(name: &str, expected: usize, actual: usize) -> CodegenError {
    CodegenError::TypeMismatch(format!(
        "{} expects {} arguments, got {}",
        name, expected, actual
    ))
}

impl ExprCompiler for SchemaInferCompiler {
    fn compile(
        &mut self,
        input: &Schema,
        exprs: &[(String, Expr)],
        row_mode: bool,
    ) -> CodegenResult<FnInfo> {
        if exprs.is_empty() {
            return Err(CodegenError::EmptyExprList);
        }

        let mut columns = Vec::with_capacity(exprs.len());
        for (name, expr) in exprs {
            match expr {
                Expr::All { relation } => {
                    let positions = input.expand_all(relation.as_deref());
                    match relation {
                        Some(r) if positions.is_empty() => {
                            return Err(CodegenError::UnknownColumn(format!("{}.*", r)));
                        }
                        _ => {}
                    }
                    for pos in positions {
                        if let Some(c) = input.column(pos) {
                            columns.push(Column::new(c.name.clone(), None, c.data_type));
                        }
                    }
                }
                other => {
                    let data_type = self.infer(input, other, row_mode)?;
                    columns.push(Column::new(name.clone(), None, data_type));
                }
            }
        }

        let fn_name = format!("{}{}", FN_NAME_PREFIX, self.next_id);
        self.next_id += 1;
        trace!(fn_name = %fn_name, columns = columns.len(), "compiled function");
        Ok(FnInfo {
            fn_name,
            fn_schema: Schema::new(columns),
        })
    }

    fn define_function(&mut self, def: &FnDef) -> CodegenResult<()> {
        let key = def.name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return Err(CodegenError::DuplicateFunction(def.name.clone()));
        }
        self.functions.insert(key, def.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableBuilder;

    fn input() -> Schema {
        let table = TableBuilder::new("db", "t1")
            .add_column("col0", DataType::String)
            .add_column("col1", DataType::Int32)
            .add_column("col2", DataType::Int16)
            .add_column("col3", DataType::Float)
            .add_column("col5", DataType::Int64)
            .add_column("ts", DataType::Timestamp)
            .build()
            .unwrap();
        Schema::from_table(&table)
    }

    fn compile_one(c: &mut SchemaInferCompiler, expr: Expr, row_mode: bool) -> CodegenResult<DataType> {
        c.compile(&input(), &[("out".into(), expr)], row_mode)
            .map(|info| info.fn_schema.columns()[0].data_type)
    }

    #[test]
    fn test_function_names_increase() {
        let mut c = SchemaInferCompiler::new();
        let a = c.compile(&input(), &[("a".into(), Expr::column("col1"))], true).unwrap();
        let b = c.compile(&input(), &[("b".into(), Expr::column("col2"))], true).unwrap();
        assert_eq!(a.fn_name, "__internal_sql_codegen_0");
        assert_eq!(b.fn_name, "__internal_sql_codegen_1");
        assert_eq!(c.compiled_count(), 2);
        assert_eq!(a.fn_schema.column_names(), vec!["a"]);
    }

    #[test]
    fn test_infer_types() {
        let mut c = SchemaInferCompiler::new();
        let sum = Expr::call("sum", vec![Expr::column("col2")]);
        assert_eq!(compile_one(&mut c, sum, false).unwrap(), DataType::Int16);

        let count = Expr::call("count", vec![Expr::All { relation: None }]);
        assert_eq!(compile_one(&mut c, count, false).unwrap(), DataType::Int64);

        let avg = Expr::call("avg", vec![Expr::column("col1")]);
        assert_eq!(compile_one(&mut c, avg, false).unwrap(), DataType::Double);

        let add = Expr::binary(Expr::column("col1"), BinaryOperator::Plus, Expr::column("col3"));
        assert_eq!(compile_one(&mut c, add, true).unwrap(), DataType::Float);

        let cmp = Expr::binary(Expr::column("col1"), BinaryOperator::Gt, Expr::Literal(Literal::Int(3)));
        assert_eq!(compile_one(&mut c, cmp, true).unwrap(), DataType::Bool);

        let shifted = Expr::binary(Expr::column("ts"), BinaryOperator::Minus, Expr::Literal(Literal::Int(10)));
        assert_eq!(compile_one(&mut c, shifted, true).unwrap(), DataType::Timestamp);

        let big = Expr::Literal(Literal::Int(i64::from(i32::MAX) + 1));
        assert_eq!(compile_one(&mut c, big, true).unwrap(), DataType::Int64);
    }

    #[test]
    fn test_errors() {
        let mut c = SchemaInferCompiler::new();
        assert_eq!(
            compile_one(&mut c, Expr::qualified("t2", "col1"), true),
            Err(CodegenError::UnknownColumn("t2.col1".into()))
        );
        assert!(matches!(
            compile_one(&mut c, Expr::call("sum", vec![Expr::column("col1")]), true),
            Err(CodegenError::AggregateInRowMode(_))
        ));
        assert!(matches!(
            compile_one(&mut c, Expr::call("nope", vec![]), true),
            Err(CodegenError::UnknownFunction(_))
        ));
        assert!(matches!(
            compile_one(&mut c, Expr::call("sum", vec![Expr::column("col0")]), false),
            Err(CodegenError::TypeMismatch(_))
        ));
        assert_eq!(
            c.compile(&input(), &[], true),
            Err(CodegenError::EmptyExprList)
        );
    }

    #[test]
    fn test_user_defined_function() {
        let mut c = SchemaInferCompiler::new();
        let def = FnDef {
            name: "my_udf".into(),
            args: vec![DataType::Int32],
            return_type: DataType::Double,
        };
        c.define_function(&def).unwrap();
        assert!(matches!(
            c.define_function(&def),
            Err(CodegenError::DuplicateFunction(_))
        ));

        let call = Expr::call("my_udf", vec![Expr::column("col1")]);
        assert_eq!(compile_one(&mut c, call, true).unwrap(), DataType::Double);
        let bad = Expr::call("my_udf", vec![]);
        assert!(matches!(compile_one(&mut c, bad, true), Err(CodegenError::TypeMismatch(_))));
    }

    #[test]
    fn test_star_expands_input() {
        let mut c = SchemaInferCompiler::new();
        let info = c
            .compile(&input(), &[("*".into(), Expr::All { relation: None })], true)
            .unwrap();
        assert_eq!(info.fn_schema.len(), 6);
        assert_eq!(info.fn_schema.columns()[1].name, "col1");

        let mixed = [
            ("t9.*".to_string(), Expr::All { relation: Some("t9".into()) }),
            ("x".to_string(), Expr::column("col1")),
        ];
        assert_eq!(
            c.compile(&input(), &mixed, true),
            Err(CodegenError::UnknownColumn("t9.*".into()))
        );
    }
}
