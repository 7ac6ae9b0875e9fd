//! Dynamically-registered functions backed by foreign-language scripts.
//!
//! Language backends are capability interfaces: the registry dispatches on a
//! language tag, and each backend only promises an executability probe plus
//! compilation into an invocable program. New languages plug in without any
//! change here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use csql_common::{CsqlError, Result};

use crate::function::{coerce_value, FunctionSignature, ScalarFunction, Value};

/// A compiled, reusable script program.
pub trait CompiledScript: Send + Sync {
    /// Invoke with named argument bindings; returns the raw script result.
    fn invoke(&self, bindings: &[(String, Value)]) -> Result<Value>;
}

/// Execution backend for one scripting language.
pub trait LanguageBackend: Send + Sync {
    /// Cheap syntactic/executability check, run before anything is registered.
    fn probe(&self, body: &str) -> bool;

    /// Compile a body into an invocable program.
    fn compile(&self, body: &str) -> Result<Arc<dyn CompiledScript>>;
}

/// Maps lowercase language tags to their backends.
#[derive(Default)]
pub struct LanguageBackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn LanguageBackend>>>,
}

impl std::fmt::Debug for LanguageBackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.backends.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("LanguageBackendRegistry")
            .field("backends", &count)
            .finish()
    }
}

impl LanguageBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the backend for a language tag.
    ///
    /// Returns `true` when an existing backend was replaced.
    pub fn register(&self, language: &str, backend: Arc<dyn LanguageBackend>) -> bool {
        self.backends
            .write()
            .expect("backend registry lock poisoned")
            .insert(language.to_ascii_lowercase(), backend)
            .is_some()
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn LanguageBackend>> {
        self.backends
            .read()
            .expect("backend registry lock poisoned")
            .get(&language.to_ascii_lowercase())
            .cloned()
    }

    /// Registered language tags in sorted order.
    pub fn languages(&self) -> Vec<String> {
        let mut names = self
            .backends
            .read()
            .expect("backend registry lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// A callable bound to a foreign script body.
///
/// The body is compiled once per callable instance and cached; argument names
/// are case-folded to lowercase at construction; the raw script result is
/// coerced to the declared return type, degrading to null (with a diagnostic)
/// when the result cannot represent it.
pub struct ScriptFunction {
    signature: FunctionSignature,
    arg_names: Vec<String>,
    language: String,
    body: String,
    backend: Arc<dyn LanguageBackend>,
    program: OnceLock<Arc<dyn CompiledScript>>,
}

impl std::fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.signature.name)
            .field("language", &self.language)
            .finish()
    }
}

impl ScriptFunction {
    pub fn new(
        signature: FunctionSignature,
        arg_names: Vec<String>,
        language: impl Into<String>,
        body: impl Into<String>,
        backend: Arc<dyn LanguageBackend>,
    ) -> Self {
        Self {
            signature,
            arg_names: arg_names
                .into_iter()
                .map(|n| n.to_ascii_lowercase())
                .collect(),
            language: language.into().to_ascii_lowercase(),
            body: body.into(),
            backend,
            program: OnceLock::new(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn program(&self) -> Result<Arc<dyn CompiledScript>> {
        if let Some(p) = self.program.get() {
            return Ok(p.clone());
        }
        let compiled = self.backend.compile(&self.body)?;
        Ok(self.program.get_or_init(|| compiled).clone())
    }
}

impl ScalarFunction for ScriptFunction {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.arg_names.len() {
            return Err(CsqlError::ForeignExecution(format!(
                "{} expects {} arguments, got {}",
                self.signature.name,
                self.arg_names.len(),
                args.len()
            )));
        }
        let program = self.program()?;
        let bindings: Vec<(String, Value)> = self
            .arg_names
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let raw = program.invoke(&bindings)?;
        match coerce_value(raw, &self.signature.return_type) {
            Some(v) => Ok(v),
            None => {
                tracing::warn!(
                    function = %self.signature.name,
                    language = %self.language,
                    return_type = %self.signature.return_type,
                    "script result does not fit the declared return type"
                );
                Ok(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        compiles: AtomicUsize,
    }

    struct FirstBinding;

    impl CompiledScript for FirstBinding {
        fn invoke(&self, bindings: &[(String, Value)]) -> Result<Value> {
            Ok(bindings
                .first()
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null))
        }
    }

    impl LanguageBackend for CountingBackend {
        fn probe(&self, body: &str) -> bool {
            !body.is_empty()
        }

        fn compile(&self, _body: &str) -> Result<Arc<dyn CompiledScript>> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FirstBinding))
        }
    }

    fn script(backend: Arc<dyn LanguageBackend>) -> ScriptFunction {
        ScriptFunction::new(
            FunctionSignature::new("echo", vec![DataType::Int64], DataType::Int64),
            vec!["X".to_string()],
            "Counting",
            "x",
            backend,
        )
    }

    #[test]
    fn compiles_once_per_callable_instance() {
        let backend = Arc::new(CountingBackend {
            compiles: AtomicUsize::new(0),
        });
        let f = script(backend.clone());
        assert_eq!(f.invoke(&[json!(1)]).unwrap(), json!(1));
        assert_eq!(f.invoke(&[json!(2)]).unwrap(), json!(2));
        assert_eq!(backend.compiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn argument_names_are_case_folded() {
        let backend = Arc::new(CountingBackend {
            compiles: AtomicUsize::new(0),
        });
        let f = script(backend);
        assert_eq!(f.arg_names, vec!["x".to_string()]);
        assert_eq!(f.language(), "counting");
    }

    #[test]
    fn arity_mismatch_degrades_to_null_at_the_boundary() {
        let backend = Arc::new(CountingBackend {
            compiles: AtomicUsize::new(0),
        });
        let f = script(backend);
        assert!(f.invoke(&[]).is_err());
        assert_eq!(f.evaluate(&[]), Value::Null);
    }

    #[test]
    fn uncoercible_result_becomes_null() {
        struct StringBackend;
        struct StringProgram;
        impl CompiledScript for StringProgram {
            fn invoke(&self, _bindings: &[(String, Value)]) -> Result<Value> {
                Ok(json!("not a number"))
            }
        }
        impl LanguageBackend for StringBackend {
            fn probe(&self, _body: &str) -> bool {
                true
            }
            fn compile(&self, _body: &str) -> Result<Arc<dyn CompiledScript>> {
                Ok(Arc::new(StringProgram))
            }
        }

        let f = ScriptFunction::new(
            FunctionSignature::new("bad", vec![], DataType::Int64),
            vec![],
            "strings",
            "whatever",
            Arc::new(StringBackend),
        );
        assert_eq!(f.invoke(&[]).unwrap(), Value::Null);
    }
}
