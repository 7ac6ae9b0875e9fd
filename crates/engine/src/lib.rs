//! The CSQL query engine.
//!
//! Architecture role:
//! - sequences Analyzer -> LogicalPlanner -> PhysicalPlanBuilder for one
//!   statement or a batch, against an isolated metastore snapshot
//! - hands compiled topologies to the execution substrate and registers each
//!   output back into the live catalog so later statements can read it
//! - hosts the DDL command layer (CREATE STREAM/TABLE, DROP, CREATE FUNCTION)
//!
//! Key modules:
//! - [`engine`]
//! - [`ddl`]
//! - [`substrate`]

pub mod ddl;
pub mod engine;
pub mod substrate;

pub use ddl::{
    ColumnDef, CreateFunctionStatement, CreateSourceStatement, DdlCommandResult, DdlStatement,
    DropSourceStatement,
};
pub use engine::{CompiledQuery, QueryEngine, QueryState};
pub use substrate::{apply_stateless, EmbeddedSubstrate, ExecutionSubstrate, QueryHandle};
