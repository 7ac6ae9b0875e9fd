//! Overloaded-function registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow_schema::DataType;

use csql_common::{CsqlError, Result};

use crate::builtins::register_builtins;
use crate::function::{FunctionSignature, ScalarFunction};

/// Owns the overload set for one function name.
///
/// Contract:
/// - `add` is atomic with respect to concurrent `resolve` calls; a lookup
///   never observes a half-registered overload set
/// - resolution prefers an exact argument-type match, then the unique
///   lowest-cost numeric widening (`Int32 -> Int64 -> Float64`, null coerces
///   to anything); an unresolvable tie is an ambiguity error
pub struct FunctionFactory {
    name: String,
    overloads: RwLock<Vec<Overload>>,
}

struct Overload {
    signature: FunctionSignature,
    callable: Arc<dyn ScalarFunction>,
}

impl std::fmt::Debug for FunctionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .overloads
            .read()
            .map(|o| o.len())
            .unwrap_or_default();
        f.debug_struct("FunctionFactory")
            .field("name", &self.name)
            .field("overloads", &count)
            .finish()
    }
}

impl FunctionFactory {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.overloads
            .read()
            .expect("overload lock poisoned")
            .is_empty()
    }

    /// Register an overload.
    ///
    /// Fails with [`CsqlError::DuplicateDefinition`] when a signature with the
    /// same argument types already exists, unless `replace` is set.
    pub fn add(
        &self,
        signature: FunctionSignature,
        callable: Arc<dyn ScalarFunction>,
        replace: bool,
    ) -> Result<()> {
        let mut overloads = self.overloads.write().expect("overload lock poisoned");
        if let Some(existing) = overloads
            .iter_mut()
            .find(|o| o.signature.matches_exact(&signature.arg_types))
        {
            if !replace {
                return Err(CsqlError::DuplicateDefinition(format!(
                    "function {}({})",
                    self.name,
                    format_types(&signature.arg_types)
                )));
            }
            existing.signature = signature;
            existing.callable = callable;
            return Ok(());
        }
        overloads.push(Overload {
            signature,
            callable,
        });
        Ok(())
    }

    /// Resolve a concrete argument-type list to exactly one callable.
    pub fn resolve(&self, arg_types: &[DataType]) -> Result<Arc<dyn ScalarFunction>> {
        let overloads = self.overloads.read().expect("overload lock poisoned");

        if let Some(exact) = overloads
            .iter()
            .find(|o| o.signature.matches_exact(arg_types))
        {
            return Ok(exact.callable.clone());
        }

        let mut best: Option<(u32, &Overload)> = None;
        let mut tied = false;
        for o in overloads.iter() {
            if let Some(cost) = widening_cost(arg_types, &o.signature.arg_types) {
                match best {
                    Some((c, _)) if cost > c => {}
                    Some((c, _)) if cost == c => tied = true,
                    _ => {
                        best = Some((cost, o));
                        tied = false;
                    }
                }
            }
        }

        match best {
            Some((_, o)) if !tied => Ok(o.callable.clone()),
            Some(_) => Err(CsqlError::AmbiguousReference(format!(
                "function {}({}) matches multiple overloads at equal cost",
                self.name,
                format_types(arg_types)
            ))),
            None => Err(CsqlError::UnresolvedReference(format!(
                "function {}({})",
                self.name,
                format_types(arg_types)
            ))),
        }
    }

    pub fn signatures(&self) -> Vec<FunctionSignature> {
        self.overloads
            .read()
            .expect("overload lock poisoned")
            .iter()
            .map(|o| o.signature.clone())
            .collect()
    }

    fn copy(&self) -> FunctionFactory {
        let overloads = self.overloads.read().expect("overload lock poisoned");
        FunctionFactory {
            name: self.name.clone(),
            overloads: RwLock::new(
                overloads
                    .iter()
                    .map(|o| Overload {
                        signature: o.signature.clone(),
                        callable: o.callable.clone(),
                    })
                    .collect(),
            ),
        }
    }
}

/// Registry of function factories keyed by case-normalized name.
pub struct FunctionRegistry {
    factories: RwLock<HashMap<String, Arc<FunctionFactory>>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.factories.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("FunctionRegistry")
            .field("factories", &count)
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// An empty registry with no functions at all.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry preloaded with the builtin scalar functions.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        register_builtins(&registry);
        registry
    }

    /// Get or create the overload-set container for `name`.
    ///
    /// Idempotent: two calls with the same name observe the same container.
    pub fn ensure_factory(&self, name: &str) -> Arc<FunctionFactory> {
        let key = name.to_ascii_lowercase();
        let mut factories = self.factories.write().expect("registry lock poisoned");
        factories
            .entry(key.clone())
            .or_insert_with(|| Arc::new(FunctionFactory::new(key)))
            .clone()
    }

    pub fn factory(&self, name: &str) -> Option<Arc<FunctionFactory>> {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Register one overload, creating the factory on first use.
    pub fn add_function(
        &self,
        signature: FunctionSignature,
        callable: Arc<dyn ScalarFunction>,
        replace: bool,
    ) -> Result<()> {
        let factory = self.ensure_factory(&signature.name);
        let name = signature.name.clone();
        factory.add(signature, callable, replace)?;
        tracing::debug!(function = %name, "registered function overload");
        Ok(())
    }

    /// Best-match overload resolution for a call site.
    pub fn resolve(&self, name: &str, arg_types: &[DataType]) -> Result<Arc<dyn ScalarFunction>> {
        let factory = self
            .factory(name)
            .ok_or_else(|| CsqlError::UnresolvedReference(format!("function {name}")))?;
        factory.resolve(arg_types)
    }

    /// Registered function names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Snapshot copy: bindings visible now are visible in the copy; later
    /// mutations on either side do not cross over. Callable implementations
    /// are shared since they are immutable.
    pub fn copy(&self) -> FunctionRegistry {
        let factories = self.factories.read().expect("registry lock poisoned");
        FunctionRegistry {
            factories: RwLock::new(
                factories
                    .iter()
                    .map(|(k, v)| (k.clone(), Arc::new(v.copy())))
                    .collect(),
            ),
        }
    }
}

/// Total cost of widening `from` into `to`, or `None` when not coercible.
///
/// Per-argument costs: exact 0, `Null` to anything 1, `Int32 -> Int64` 1,
/// `Int64 -> Float64` 1, `Int32 -> Float64` 2.
fn widening_cost(from: &[DataType], to: &[DataType]) -> Option<u32> {
    if from.len() != to.len() {
        return None;
    }
    let mut total = 0;
    for (f, t) in from.iter().zip(to.iter()) {
        total += arg_widening_cost(f, t)?;
    }
    Some(total)
}

fn arg_widening_cost(from: &DataType, to: &DataType) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    match (from, to) {
        (DataType::Null, _) => Some(1),
        (DataType::Int32, DataType::Int64) => Some(1),
        (DataType::Int64, DataType::Float64) => Some(1),
        (DataType::Int32, DataType::Float64) => Some(2),
        _ => None,
    }
}

fn format_types(types: &[DataType]) -> String {
    types
        .iter()
        .map(|t| format!("{t}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinFunction;
    use serde_json::json;

    fn constant_fn(name: &str, arg_types: Vec<DataType>, out: i64) -> Arc<dyn ScalarFunction> {
        let signature = FunctionSignature::new(name, arg_types, DataType::Int64);
        Arc::new(BuiltinFunction::new(signature, move |_args| {
            Ok(json!(out))
        }))
    }

    #[test]
    fn ensure_factory_is_idempotent() {
        let registry = FunctionRegistry::new();
        let a = registry.ensure_factory("double_it");
        let b = registry.ensure_factory("DOUBLE_IT");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.names(), vec!["double_it".to_string()]);
    }

    #[test]
    fn duplicate_signature_fails_without_replace() {
        let registry = FunctionRegistry::new();
        let sig = FunctionSignature::new("f", vec![DataType::Int64], DataType::Int64);
        registry
            .add_function(sig.clone(), constant_fn("f", vec![DataType::Int64], 1), false)
            .unwrap();
        let err = registry
            .add_function(sig.clone(), constant_fn("f", vec![DataType::Int64], 2), false)
            .unwrap_err();
        assert!(matches!(err, CsqlError::DuplicateDefinition(_)));

        registry
            .add_function(sig, constant_fn("f", vec![DataType::Int64], 2), true)
            .unwrap();
        let resolved = registry.resolve("f", &[DataType::Int64]).unwrap();
        assert_eq!(resolved.invoke(&[json!(0)]).unwrap(), json!(2));
    }

    #[test]
    fn exact_match_beats_widening() {
        let registry = FunctionRegistry::new();
        registry
            .add_function(
                FunctionSignature::new("g", vec![DataType::Int64], DataType::Int64),
                constant_fn("g", vec![DataType::Int64], 64),
                false,
            )
            .unwrap();
        registry
            .add_function(
                FunctionSignature::new("g", vec![DataType::Float64], DataType::Int64),
                constant_fn("g", vec![DataType::Float64], 65),
                false,
            )
            .unwrap();

        // Int32 widens to Int64 at cost 1 and Float64 at cost 2.
        let resolved = registry.resolve("g", &[DataType::Int32]).unwrap();
        assert_eq!(resolved.invoke(&[json!(1)]).unwrap(), json!(64));

        let exact = registry.resolve("g", &[DataType::Float64]).unwrap();
        assert_eq!(exact.invoke(&[json!(1.0)]).unwrap(), json!(65));
    }

    #[test]
    fn no_matching_overload_is_unresolved() {
        let registry = FunctionRegistry::new();
        registry
            .add_function(
                FunctionSignature::new("h", vec![DataType::Utf8], DataType::Utf8),
                constant_fn("h", vec![DataType::Utf8], 0),
                false,
            )
            .unwrap();
        let err = registry.resolve("h", &[DataType::Int64]).unwrap_err();
        assert!(matches!(err, CsqlError::UnresolvedReference(_)));

        let err = registry.resolve("missing", &[]).unwrap_err();
        assert!(matches!(err, CsqlError::UnresolvedReference(_)));
    }

    #[test]
    fn copy_isolates_later_registrations() {
        let registry = FunctionRegistry::new();
        registry
            .add_function(
                FunctionSignature::new("before", vec![], DataType::Int64),
                constant_fn("before", vec![], 1),
                false,
            )
            .unwrap();

        let copy = registry.copy();
        registry
            .add_function(
                FunctionSignature::new("after", vec![], DataType::Int64),
                constant_fn("after", vec![], 2),
                false,
            )
            .unwrap();

        assert!(copy.resolve("before", &[]).is_ok());
        assert!(copy.resolve("after", &[]).is_err());
        assert!(registry.resolve("after", &[]).is_ok());
    }
}
