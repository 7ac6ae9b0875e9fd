//! Row-level expression evaluation.
//!
//! Used by the embedded substrate and by tests to push individual rows
//! through stateless transforms. Function calls dispatch through the
//! registry's callable boundary, so a failing function degrades that cell to
//! null instead of failing the row.

use serde_json::json;

use csql_catalog::function::{coerce_value, Value};
use csql_catalog::FunctionRegistry;
use csql_common::{CsqlError, Result};

use crate::logical_plan::{BinaryOp, Expr, LiteralValue};

/// Evaluate one analyzed expression against a row.
pub fn evaluate(expr: &Expr, row: &[Value], functions: &FunctionRegistry) -> Result<Value> {
    match expr {
        Expr::ColumnRef { name, index } => row.get(*index).cloned().ok_or_else(|| {
            CsqlError::Execution(format!("row has no column {index} ({name})"))
        }),
        Expr::Column(name) => Err(CsqlError::Execution(format!(
            "unresolved column reference at runtime: {name}"
        ))),
        Expr::Literal(v) => Ok(literal_to_value(v)),
        Expr::Cast { expr, to_type } => {
            let v = evaluate(expr, row, functions)?;
            Ok(coerce_value(v, to_type).unwrap_or(Value::Null))
        }
        Expr::And(l, r) => {
            let l = evaluate(l, row, functions)?;
            let r = evaluate(r, row, functions)?;
            Ok(match (l.as_bool(), r.as_bool()) {
                (Some(a), Some(b)) => Value::Bool(a && b),
                _ => Value::Null,
            })
        }
        Expr::Or(l, r) => {
            let l = evaluate(l, row, functions)?;
            let r = evaluate(r, row, functions)?;
            Ok(match (l.as_bool(), r.as_bool()) {
                (Some(a), Some(b)) => Value::Bool(a || b),
                _ => Value::Null,
            })
        }
        Expr::Not(e) => {
            let v = evaluate(e, row, functions)?;
            Ok(v.as_bool().map(|b| Value::Bool(!b)).unwrap_or(Value::Null))
        }
        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, row, functions)?;
            let r = evaluate(right, row, functions)?;
            eval_binary(*op, l, r)
        }
        Expr::FunctionCall {
            name,
            args,
            arg_types,
            ..
        } => {
            let callable = functions.resolve(name, arg_types)?;
            let mut argv = Vec::with_capacity(args.len());
            for a in args {
                argv.push(evaluate(a, row, functions)?);
            }
            Ok(callable.evaluate(&argv))
        }
    }
}

/// Evaluate a boolean predicate for filtering; null counts as not matching.
pub fn matches(predicate: &Expr, row: &[Value], functions: &FunctionRegistry) -> Result<bool> {
    Ok(evaluate(predicate, row, functions)?
        .as_bool()
        .unwrap_or(false))
}

fn literal_to_value(v: &LiteralValue) -> Value {
    match v {
        LiteralValue::Int64(i) => json!(i),
        LiteralValue::Float64(f) => json!(f),
        LiteralValue::Utf8(s) => json!(s),
        LiteralValue::Boolean(b) => json!(b),
        LiteralValue::Null => Value::Null,
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_eq(&l, &r))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_eq(&l, &r))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ord = compare_values(&l, &r)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::LtEq => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply => {
            // Integer arithmetic stays integral when both sides are integral.
            match (l.as_i64(), r.as_i64()) {
                (Some(a), Some(b)) => Ok(json!(match op {
                    BinaryOp::Plus => a + b,
                    BinaryOp::Minus => a - b,
                    _ => a * b,
                })),
                _ => {
                    let (a, b) = numeric_pair(&l, &r)?;
                    Ok(json!(match op {
                        BinaryOp::Plus => a + b,
                        BinaryOp::Minus => a - b,
                        _ => a * b,
                    }))
                }
            }
        }
        BinaryOp::Divide => {
            let (a, b) = numeric_pair(&l, &r)?;
            if b == 0.0 {
                return Ok(Value::Null);
            }
            Ok(json!(a / b))
        }
    }
}

fn values_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            let (x, y) = numeric_pair(a, b)?;
            Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(CsqlError::Execution(format!(
            "cannot order values {a} and {b}"
        ))),
    }
}

fn numeric_pair(a: &Value, b: &Value) -> Result<(f64, f64)> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(CsqlError::Execution(format!(
            "arithmetic on non-numeric values {a} and {b}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::{BinaryOp, Expr, LiteralValue};
    use arrow_schema::DataType;

    fn lit(i: i64) -> Expr {
        Expr::Literal(LiteralValue::Int64(i))
    }

    #[test]
    fn arithmetic_and_comparison() {
        let functions = FunctionRegistry::new();
        let sum = Expr::BinaryOp {
            left: Box::new(lit(40)),
            op: BinaryOp::Plus,
            right: Box::new(lit(2)),
        };
        assert_eq!(evaluate(&sum, &[], &functions).unwrap(), json!(42));

        let cmp = Expr::BinaryOp {
            left: Box::new(sum),
            op: BinaryOp::Gt,
            right: Box::new(lit(41)),
        };
        assert!(matches(&cmp, &[], &functions).unwrap());
    }

    #[test]
    fn division_produces_float_and_null_on_zero() {
        let functions = FunctionRegistry::new();
        let div = Expr::BinaryOp {
            left: Box::new(lit(1)),
            op: BinaryOp::Divide,
            right: Box::new(lit(2)),
        };
        assert_eq!(evaluate(&div, &[], &functions).unwrap(), json!(0.5));

        let by_zero = Expr::BinaryOp {
            left: Box::new(lit(1)),
            op: BinaryOp::Divide,
            right: Box::new(lit(0)),
        };
        assert_eq!(evaluate(&by_zero, &[], &functions).unwrap(), Value::Null);
    }

    #[test]
    fn null_predicate_does_not_match() {
        let functions = FunctionRegistry::new();
        let pred = Expr::BinaryOp {
            left: Box::new(Expr::Literal(LiteralValue::Null)),
            op: BinaryOp::Eq,
            right: Box::new(lit(1)),
        };
        assert!(!matches(&pred, &[], &functions).unwrap());
    }

    #[test]
    fn builtin_function_call_round_trips() {
        let functions = FunctionRegistry::with_builtins();
        let call = Expr::FunctionCall {
            name: "ucase".to_string(),
            args: vec![Expr::ColumnRef {
                name: "item".to_string(),
                index: 0,
            }],
            arg_types: vec![DataType::Utf8],
            return_type: DataType::Utf8,
        };
        let out = evaluate(&call, &[json!("socks")], &functions).unwrap();
        assert_eq!(out, json!("SOCKS"));
    }

    #[test]
    fn cast_failure_degrades_to_null() {
        let functions = FunctionRegistry::new();
        let cast = Expr::Cast {
            expr: Box::new(Expr::Literal(LiteralValue::Boolean(true))),
            to_type: DataType::Int64,
        };
        assert_eq!(evaluate(&cast, &[], &functions).unwrap(), Value::Null);
    }
}
