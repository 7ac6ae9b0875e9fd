//! The execution-substrate boundary.
//!
//! The engine emits an opaque runnable topology and expects back a start/stop
//! handle; it can ask the handle for physical properties (the partition key)
//! but never reaches into the runtime's internals.

use std::sync::RwLock;

use csql_catalog::function::Value;
use csql_catalog::FunctionRegistry;
use csql_common::{CsqlError, Result};
use csql_planner::{eval, OutputDescriptor, StreamsNode, StreamsTopology};

/// A started query on the substrate.
pub trait QueryHandle: Send {
    fn application_id(&self) -> &str;

    /// Field the output is partitioned by, when keyed.
    fn key_field(&self) -> Option<&str>;

    /// Stop consuming and release substrate resources. The catalog entry
    /// stays until removed by explicit DDL.
    fn stop(&mut self) -> Result<()>;
}

/// Capability interface to the streaming runtime.
pub trait ExecutionSubstrate: Send + Sync {
    /// Begin consuming the topology; blocks until the query is live.
    fn start(
        &self,
        topology: StreamsTopology,
        output: &OutputDescriptor,
    ) -> Result<Box<dyn QueryHandle>>;
}

/// In-process substrate used by embedded deployments and tests.
///
/// Records started topologies and drives rows through stateless operators via
/// [`apply_stateless`]; it does not persist state or perform topic I/O.
#[derive(Debug, Default)]
pub struct EmbeddedSubstrate {
    started: RwLock<Vec<String>>,
}

impl EmbeddedSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Application ids of every topology started on this substrate.
    pub fn started_applications(&self) -> Vec<String> {
        self.started
            .read()
            .expect("substrate lock poisoned")
            .clone()
    }
}

impl ExecutionSubstrate for EmbeddedSubstrate {
    fn start(
        &self,
        topology: StreamsTopology,
        output: &OutputDescriptor,
    ) -> Result<Box<dyn QueryHandle>> {
        self.started
            .write()
            .expect("substrate lock poisoned")
            .push(topology.application_id.clone());
        tracing::info!(
            application_id = %topology.application_id,
            sink_topic = %output.topic,
            "started embedded topology"
        );
        Ok(Box::new(EmbeddedHandle {
            application_id: topology.application_id,
            key_field: output.key_field.clone(),
            running: true,
        }))
    }
}

struct EmbeddedHandle {
    application_id: String,
    key_field: Option<String>,
    running: bool,
}

impl QueryHandle for EmbeddedHandle {
    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            tracing::info!(application_id = %self.application_id, "stopped embedded topology");
        }
        Ok(())
    }
}

/// Drive one row through the stateless part of a topology.
///
/// Returns `None` when a filter drops the row. Stateful operators (keyed
/// aggregation, joins) need the real substrate's state stores and are
/// rejected here.
pub fn apply_stateless(
    node: &StreamsNode,
    row: &[Value],
    functions: &FunctionRegistry,
) -> Result<Option<Vec<Value>>> {
    match node {
        StreamsNode::TopicSource(_) => Ok(Some(row.to_vec())),
        StreamsNode::FilterRows(f) => {
            let Some(input) = apply_stateless(&f.input, row, functions)? else {
                return Ok(None);
            };
            if eval::matches(&f.predicate, &input, functions)? {
                Ok(Some(input))
            } else {
                Ok(None)
            }
        }
        StreamsNode::MapValues(m) => {
            let Some(input) = apply_stateless(&m.input, row, functions)? else {
                return Ok(None);
            };
            let mut out = Vec::with_capacity(m.exprs.len());
            for (expr, _name) in &m.exprs {
                out.push(eval::evaluate(expr, &input, functions)?);
            }
            Ok(Some(out))
        }
        // Rekeying does not change the row itself.
        StreamsNode::Repartition(r) => apply_stateless(&r.input, row, functions),
        StreamsNode::TopicSink(s) => apply_stateless(&s.input, row, functions),
        StreamsNode::KeyedAggregate(_) | StreamsNode::KeyedJoin(_) => Err(CsqlError::Execution(
            "stateful operators are not supported by the embedded row driver".to_string(),
        )),
    }
}
