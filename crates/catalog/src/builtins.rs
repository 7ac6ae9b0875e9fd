//! Builtin scalar functions preloaded into every registry.

use std::sync::Arc;

use arrow_schema::DataType;
use serde_json::json;

use csql_common::{CsqlError, Result};

use crate::function::{FunctionSignature, ScalarFunction, Value};
use crate::registry::FunctionRegistry;

/// A scalar function backed by a plain Rust closure.
pub struct BuiltinFunction<F> {
    signature: FunctionSignature,
    body: F,
}

impl<F> BuiltinFunction<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    pub fn new(signature: FunctionSignature, body: F) -> Self {
        Self { signature, body }
    }
}

impl<F> ScalarFunction for BuiltinFunction<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.signature.arg_types.len() {
            return Err(CsqlError::Execution(format!(
                "{} expects {} arguments, got {}",
                self.signature.name,
                self.signature.arg_types.len(),
                args.len()
            )));
        }
        (self.body)(args)
    }
}

fn arg_str<'a>(args: &'a [Value], idx: usize, func: &str) -> Result<Option<&'a str>> {
    match &args[idx] {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(CsqlError::Execution(format!(
            "{func} expects a string argument, got {other}"
        ))),
    }
}

fn register(
    registry: &FunctionRegistry,
    name: &str,
    arg_types: Vec<DataType>,
    return_type: DataType,
    body: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
) {
    let signature = FunctionSignature::new(name, arg_types, return_type)
        .with_metadata("csql", "1", "builtin scalar function");
    let callable: Arc<dyn ScalarFunction> = Arc::new(BuiltinFunction::new(signature.clone(), body));
    registry
        .add_function(signature, callable, false)
        .expect("builtin registration cannot collide");
}

pub(crate) fn register_builtins(registry: &FunctionRegistry) {
    register(
        registry,
        "ucase",
        vec![DataType::Utf8],
        DataType::Utf8,
        |args| {
            Ok(arg_str(args, 0, "ucase")?
                .map(|s| json!(s.to_uppercase()))
                .unwrap_or(Value::Null))
        },
    );
    register(
        registry,
        "lcase",
        vec![DataType::Utf8],
        DataType::Utf8,
        |args| {
            Ok(arg_str(args, 0, "lcase")?
                .map(|s| json!(s.to_lowercase()))
                .unwrap_or(Value::Null))
        },
    );
    register(
        registry,
        "len",
        vec![DataType::Utf8],
        DataType::Int32,
        |args| {
            Ok(arg_str(args, 0, "len")?
                .map(|s| json!(s.chars().count()))
                .unwrap_or(Value::Null))
        },
    );
    register(
        registry,
        "concat",
        vec![DataType::Utf8, DataType::Utf8],
        DataType::Utf8,
        |args| {
            let a = arg_str(args, 0, "concat")?;
            let b = arg_str(args, 1, "concat")?;
            Ok(match (a, b) {
                (Some(a), Some(b)) => json!(format!("{a}{b}")),
                _ => Value::Null,
            })
        },
    );
    // abs carries two overloads on purpose: the registry's widening rule is
    // exercised by integer literals narrower than Int64.
    register(
        registry,
        "abs",
        vec![DataType::Int64],
        DataType::Int64,
        |args| match &args[0] {
            Value::Null => Ok(Value::Null),
            v => v
                .as_i64()
                .map(|i| json!(i.abs()))
                .ok_or_else(|| CsqlError::Execution("abs expects an integer".to_string())),
        },
    );
    register(
        registry,
        "abs",
        vec![DataType::Float64],
        DataType::Float64,
        |args| match &args[0] {
            Value::Null => Ok(Value::Null),
            v => v
                .as_f64()
                .map(|f| json!(f.abs()))
                .ok_or_else(|| CsqlError::Execution("abs expects a number".to_string())),
        },
    );
    register(
        registry,
        "round",
        vec![DataType::Float64],
        DataType::Int64,
        |args| match &args[0] {
            Value::Null => Ok(Value::Null),
            v => v
                .as_f64()
                .map(|f| json!(f.round() as i64))
                .ok_or_else(|| CsqlError::Execution("round expects a number".to_string())),
        },
    );
}
