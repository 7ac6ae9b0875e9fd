//! The shared catalog of data sources and functions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use csql_common::{CsqlError, Result};

use crate::registry::FunctionRegistry;
use crate::source::DataSource;

/// Registry of every published data source, owning the function registry.
///
/// Concurrency contract:
/// - all mutations are mutually exclusive and atomic with respect to reads;
///   a reader never observes a half-applied mutation
/// - planners read an isolated [`MetaStore::copy`], so the live store is
///   never locked for the duration of a compile
#[derive(Debug)]
pub struct MetaStore {
    sources: RwLock<HashMap<String, Arc<DataSource>>>,
    functions: FunctionRegistry,
}

impl Default for MetaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaStore {
    /// A metastore with no sources and the builtin functions registered.
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            functions: FunctionRegistry::with_builtins(),
        }
    }

    pub fn get_source(&self, name: &str) -> Option<Arc<DataSource>> {
        self.sources
            .read()
            .expect("source map lock poisoned")
            .get(name)
            .cloned()
    }

    /// Insert or wholesale-replace a source definition.
    pub fn put_source(&self, source: DataSource) {
        let name = source.name.clone();
        let replaced = self
            .sources
            .write()
            .expect("source map lock poisoned")
            .insert(name.clone(), Arc::new(source))
            .is_some();
        tracing::info!(source = %name, replaced, "published data source");
    }

    /// Remove a source; removal is explicit, so a missing name is an error.
    pub fn delete_source(&self, name: &str) -> Result<()> {
        let removed = self
            .sources
            .write()
            .expect("source map lock poisoned")
            .remove(name);
        match removed {
            Some(_) => {
                tracing::info!(source = %name, "dropped data source");
                Ok(())
            }
            None => Err(CsqlError::NotFound(format!("source {name}"))),
        }
    }

    /// Published source names in sorted order.
    pub fn source_names(&self) -> Vec<String> {
        let mut names = self
            .sources
            .read()
            .expect("source map lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Isolated snapshot for planning.
    ///
    /// Sources and function bindings visible at copy time are visible in the
    /// copy; later mutations to either side do not cross over. Source entries
    /// are shared `Arc`s since published definitions are immutable.
    pub fn copy(&self) -> MetaStore {
        let sources = self.sources.read().expect("source map lock poisoned");
        MetaStore {
            sources: RwLock::new(sources.clone()),
            functions: self.functions.copy(),
        }
    }
}
