//! Callable function contract and signature metadata.

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

use csql_common::Result;

/// Runtime value passed into and out of callable functions.
pub type Value = serde_json::Value;

/// Identity and metadata of one function overload.
///
/// Two signatures are the same definition when name and argument types match;
/// the return type is not part of the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Case-normalized (ASCII lowercase) function name.
    pub name: String,
    pub arg_types: Vec<DataType>,
    pub return_type: DataType,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, arg_types: Vec<DataType>, return_type: DataType) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            arg_types,
            return_type,
            author: String::new(),
            version: String::new(),
            description: String::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        author: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.author = author.into();
        self.version = version.into();
        self.description = description.into();
        self
    }

    pub fn matches_exact(&self, arg_types: &[DataType]) -> bool {
        self.arg_types.as_slice() == arg_types
    }
}

/// One concrete, invocable function implementation bound into the registry.
pub trait ScalarFunction: Send + Sync {
    fn signature(&self) -> &FunctionSignature;

    /// Invoke with a fixed-arity argument array.
    fn invoke(&self, args: &[Value]) -> Result<Value>;

    /// Invocation boundary used by row evaluation: failures never cross it.
    ///
    /// A failed invocation yields `Value::Null` plus a diagnostic event, so a
    /// misbehaving function cannot tear down the owning query.
    fn evaluate(&self, args: &[Value]) -> Value {
        match self.invoke(args) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    function = %self.signature().name,
                    error = %e,
                    "function invocation failed, returning null"
                );
                Value::Null
            }
        }
    }
}

impl std::fmt::Debug for dyn ScalarFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("signature", self.signature())
            .finish()
    }
}

/// Coerce a runtime value to a declared type.
///
/// Returns `None` when the value cannot represent the target type; callers
/// decide whether that degrades to null or surfaces as an error.
pub fn coerce_value(value: Value, target: &DataType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        DataType::Boolean => value.as_bool().map(Value::Bool),
        DataType::Int32 | DataType::Int64 => match &value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from),
            _ => None,
        },
        DataType::Float64 => value.as_f64().map(Value::from),
        DataType::Utf8 => match value {
            Value::String(s) => Some(Value::String(s)),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_name_is_case_normalized() {
        let sig = FunctionSignature::new("Double_It", vec![DataType::Int32], DataType::Int32);
        assert_eq!(sig.name, "double_it");
    }

    #[test]
    fn coerce_between_numeric_types() {
        assert_eq!(
            coerce_value(json!(21.9), &DataType::Int64),
            Some(json!(21))
        );
        assert_eq!(
            coerce_value(json!(21), &DataType::Float64),
            Some(json!(21.0))
        );
        assert_eq!(coerce_value(json!("x"), &DataType::Int64), None);
    }

    #[test]
    fn null_coerces_to_anything() {
        assert_eq!(
            coerce_value(Value::Null, &DataType::Utf8),
            Some(Value::Null)
        );
    }
}
