//! The CSQL metastore: named data sources plus the function registry.
//!
//! Architecture role:
//! - [`MetaStore`] owns every published [`DataSource`] and the
//!   [`FunctionRegistry`]; it is the only shared mutable state in the engine
//! - `copy()` produces an isolated snapshot so a batch of dependent queries
//!   can be planned without touching the live catalog
//! - functions are overload sets resolved by argument types; implementations
//!   are either builtin or scripted through a [`LanguageBackend`]
//!
//! Key modules:
//! - [`source`]
//! - [`metastore`]
//! - [`registry`]
//! - [`function`]
//! - [`script`]

pub mod builtins;
pub mod function;
pub mod metastore;
pub mod registry;
pub mod script;
pub mod source;

pub use function::{FunctionSignature, ScalarFunction, Value};
pub use metastore::MetaStore;
pub use registry::{FunctionFactory, FunctionRegistry};
pub use script::{CompiledScript, LanguageBackend, LanguageBackendRegistry, ScriptFunction};
pub use source::{DataSource, SourceKind};
