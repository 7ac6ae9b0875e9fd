use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use sqlparser::ast::{Query, Statement};

use csql_catalog::{DataSource, LanguageBackendRegistry, MetaStore};
use csql_common::{CsqlError, EngineConfig, MetricsRegistry, QueryId, Result};
use csql_planner::{
    Analyzer, LogicalPlanner, OutputDescriptor, PhysicalPlanBuilder, PhysicalPlannerConfig,
    StreamsTopology,
};

use crate::ddl::{run_ddl, DdlCommandResult, DdlStatement};
use crate::substrate::{ExecutionSubstrate, QueryHandle};

/// Lifecycle of one statement through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Analyzed,
    LogicallyPlanned,
    PhysicallyPlanned,
    Started,
    Failed(String),
}

/// A fully compiled statement, not yet handed to the substrate.
#[derive(Debug)]
pub struct CompiledQuery {
    pub id: QueryId,
    pub topology: StreamsTopology,
    pub output: OutputDescriptor,
}

struct QueryRecord {
    state: QueryState,
    output: Option<OutputDescriptor>,
    handle: Option<Box<dyn QueryHandle>>,
}

/// Orchestrates compilation and execution of continuous queries.
///
/// Compilation runs against an isolated [`MetaStore::copy`], so concurrent
/// statements never contend on the live catalog; the only lock-holding steps
/// are the final registration writes. Starting a query on the substrate
/// blocks, but never while a catalog lock is held.
pub struct QueryEngine {
    config: EngineConfig,
    metastore: Arc<MetaStore>,
    backends: Arc<LanguageBackendRegistry>,
    substrate: Arc<dyn ExecutionSubstrate>,
    metrics: MetricsRegistry,
    analyzer: Analyzer,
    planner: LogicalPlanner,
    next_id: AtomicU64,
    queries: RwLock<HashMap<QueryId, QueryRecord>>,
}

impl QueryEngine {
    pub fn new(config: EngineConfig, substrate: Arc<dyn ExecutionSubstrate>) -> Self {
        Self {
            config,
            metastore: Arc::new(MetaStore::new()),
            backends: Arc::new(LanguageBackendRegistry::new()),
            substrate,
            metrics: MetricsRegistry::new(),
            analyzer: Analyzer::new(),
            planner: LogicalPlanner::new(),
            next_id: AtomicU64::new(1),
            queries: RwLock::new(HashMap::new()),
        }
    }

    pub fn metastore(&self) -> &MetaStore {
        &self.metastore
    }

    pub fn backends(&self) -> &LanguageBackendRegistry {
        &self.backends
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.render_prometheus()
    }

    /// Execute one SQL statement: a bare SELECT gets a generated output name,
    /// CREATE TABLE ... AS SELECT publishes under the given name.
    pub fn execute_sql(&self, sql: &str) -> Result<QueryId> {
        let mut stmts = csql_sql::parse_sql(sql)?;
        if stmts.len() != 1 {
            return Err(CsqlError::Planning(
                "expected a single SQL statement".to_string(),
            ));
        }
        match stmts.remove(0) {
            Statement::Query(q) => self.execute_query(None, &q),
            Statement::CreateTable(ct) => {
                let Some(query) = &ct.query else {
                    return Err(CsqlError::Planning(
                        "CREATE TABLE without AS SELECT must be submitted as a DDL statement"
                            .to_string(),
                    ));
                };
                let name = ct
                    .name
                    .0
                    .iter()
                    .map(|i| i.value.clone())
                    .collect::<Vec<_>>()
                    .join(".");
                self.execute_query(Some(name), query)
            }
            other => Err(CsqlError::Planning(format!(
                "unsupported statement: {other}"
            ))),
        }
    }

    /// Compile one statement against a fresh catalog snapshot without
    /// starting it; nothing is committed.
    pub fn compile_query(
        &self,
        sink_name: Option<String>,
        query: &Query,
    ) -> Result<CompiledQuery> {
        let id = self.allocate_id();
        let sink_name =
            sink_name.unwrap_or_else(|| format!("{}output_{}", self.config.app_id_prefix, id));

        let snapshot = self.metastore.copy();
        self.compile(id, query, &snapshot, &sink_name)
            .map_err(|e| {
                self.record_failure(id, &e);
                e
            })
    }

    /// Compile and start one continuous query, then register its output in
    /// the live catalog.
    pub fn execute_query(&self, sink_name: Option<String>, query: &Query) -> Result<QueryId> {
        let compiled = self.compile_query(sink_name, query)?;
        self.start_and_register(compiled)
    }

    /// Plan a batch of interdependent statements together, then commit
    /// all-or-nothing.
    ///
    /// Every statement is planned against one private catalog copy, with each
    /// statement's output threaded back into that copy so later statements
    /// can reference it. Only after the whole batch compiles is anything
    /// started or registered; a failure partway commits none of it.
    pub fn execute_batch(&self, statements: &[(String, Query)]) -> Result<Vec<QueryId>> {
        let scratch = self.metastore.copy();

        let mut compiled = Vec::with_capacity(statements.len());
        for (sink_name, query) in statements {
            let id = self.allocate_id();
            let c = match self.compile(id, query, &scratch, sink_name) {
                Ok(c) => c,
                Err(e) => {
                    self.record_failure(id, &e);
                    return Err(e);
                }
            };
            scratch.put_source(source_from_output(&c.output));
            compiled.push(c);
        }

        let mut ids = Vec::with_capacity(compiled.len());
        for c in compiled {
            ids.push(self.start_and_register(c)?);
        }
        Ok(ids)
    }

    /// Run one DDL statement against the live catalog.
    pub fn execute_ddl(&self, stmt: &DdlStatement) -> Result<DdlCommandResult> {
        run_ddl(stmt, &self.metastore, &self.backends)
    }

    /// Stop a started query and release its substrate resources. Its catalog
    /// entry stays until dropped by explicit DDL.
    pub fn terminate(&self, id: QueryId) -> Result<()> {
        let mut queries = self.queries.write().expect("query map lock poisoned");
        let record = queries
            .get_mut(&id)
            .ok_or_else(|| CsqlError::NotFound(format!("query {id}")))?;
        if let Some(handle) = record.handle.as_mut() {
            handle.stop()?;
        }
        queries.remove(&id);
        tracing::info!(query_id = %id, "terminated query");
        Ok(())
    }

    pub fn state(&self, id: QueryId) -> Option<QueryState> {
        self.queries
            .read()
            .expect("query map lock poisoned")
            .get(&id)
            .map(|r| r.state.clone())
    }

    pub fn output(&self, id: QueryId) -> Option<OutputDescriptor> {
        self.queries
            .read()
            .expect("query map lock poisoned")
            .get(&id)
            .and_then(|r| r.output.clone())
    }

    /// Sequence Analyzer -> LogicalPlanner -> PhysicalPlanBuilder against the
    /// given snapshot. Pure except for metrics; nothing is committed.
    fn compile(
        &self,
        id: QueryId,
        query: &Query,
        snapshot: &MetaStore,
        sink_name: &str,
    ) -> Result<CompiledQuery> {
        self.set_state(id, QueryState::Received);

        let t = Instant::now();
        let analysis = self
            .analyzer
            .analyze(query, snapshot, sink_name)
            .map_err(|e| self.fail_stage("analyze", e))?;
        self.metrics
            .observe_compile_seconds("analyze", t.elapsed().as_secs_f64());
        self.set_state(id, QueryState::Analyzed);

        let t = Instant::now();
        let logical = self
            .planner
            .build_plan(&analysis)
            .map_err(|e| self.fail_stage("logical_plan", e))?;
        self.metrics
            .observe_compile_seconds("logical_plan", t.elapsed().as_secs_f64());
        self.set_state(id, QueryState::LogicallyPlanned);

        let t = Instant::now();
        let mut builder =
            PhysicalPlanBuilder::new(PhysicalPlannerConfig::from(&self.config));
        let (topology, output) = builder
            .build(id, &logical)
            .map_err(|e| self.fail_stage("physical_plan", e))?;
        self.metrics
            .observe_compile_seconds("physical_plan", t.elapsed().as_secs_f64());
        self.set_state(id, QueryState::PhysicallyPlanned);

        self.metrics.inc_compiled("ok");
        Ok(CompiledQuery {
            id,
            topology,
            output,
        })
    }

    /// Hand a compiled query to the substrate, then publish its output.
    ///
    /// `start` blocks; no catalog lock is held across it.
    fn start_and_register(&self, compiled: CompiledQuery) -> Result<QueryId> {
        let CompiledQuery {
            id,
            topology,
            output,
        } = compiled;

        let handle = match self.substrate.start(topology, &output) {
            Ok(h) => h,
            Err(e) => {
                self.record_failure(id, &e);
                return Err(e);
            }
        };

        self.metastore.put_source(source_from_output(&output));
        self.metrics.inc_started(&id.to_string());
        tracing::info!(
            query_id = %id,
            output = %output.name,
            topic = %output.topic,
            "query started, output registered"
        );

        self.queries
            .write()
            .expect("query map lock poisoned")
            .insert(
                id,
                QueryRecord {
                    state: QueryState::Started,
                    output: Some(output),
                    handle: Some(handle),
                },
            );
        Ok(id)
    }

    fn allocate_id(&self) -> QueryId {
        QueryId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn set_state(&self, id: QueryId, state: QueryState) {
        self.queries
            .write()
            .expect("query map lock poisoned")
            .entry(id)
            .and_modify(|r| r.state = state.clone())
            .or_insert(QueryRecord {
                state,
                output: None,
                handle: None,
            });
    }

    fn fail_stage(&self, stage: &str, e: CsqlError) -> CsqlError {
        self.metrics.inc_compiled(stage);
        e
    }

    fn record_failure(&self, id: QueryId, e: &CsqlError) {
        tracing::warn!(query_id = %id, error = %e, "query failed");
        self.set_state(id, QueryState::Failed(e.to_string()));
    }
}

fn source_from_output(output: &OutputDescriptor) -> DataSource {
    DataSource::new(
        &output.name,
        output.schema.clone(),
        output.key_field.clone(),
        output.kind,
        &output.topic,
    )
}
