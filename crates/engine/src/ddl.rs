//! DDL commands that act directly on the catalog.
//!
//! Expected outcomes (already-exists, not-found) come back as a
//! [`DdlCommandResult`] rather than an error; only internal failures and
//! non-executable function bodies fail loudly.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};

use csql_catalog::{
    DataSource, FunctionSignature, LanguageBackendRegistry, MetaStore, ScriptFunction, SourceKind,
};
use csql_common::{CsqlError, Result};

/// A declared `name TYPE` element of a source schema or function argument
/// list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// SQL type name (`BOOLEAN`, `INT`, `BIGINT`, `DOUBLE`, `VARCHAR`).
    pub sql_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// CREATE STREAM / CREATE TABLE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSourceStatement {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Field the backing topic is partitioned by.
    pub key: Option<String>,
    pub topic: String,
    pub kind: SourceKind,
    pub replace: bool,
}

/// DROP STREAM / DROP TABLE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropSourceStatement {
    pub name: String,
}

/// CREATE FUNCTION with an inline foreign-language body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFunctionStatement {
    pub name: String,
    pub args: Vec<ColumnDef>,
    pub return_type: String,
    pub language: String,
    pub body: String,
    pub replace: bool,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// The statement tree produced by the external DDL parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DdlStatement {
    CreateSource(CreateSourceStatement),
    DropSource(DropSourceStatement),
    CreateFunction(CreateFunctionStatement),
}

/// Outcome of one DDL command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdlCommandResult {
    pub success: bool,
    pub message: String,
}

impl DdlCommandResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Run one DDL statement against the live catalog.
pub fn run_ddl(
    stmt: &DdlStatement,
    metastore: &MetaStore,
    backends: &LanguageBackendRegistry,
) -> Result<DdlCommandResult> {
    match stmt {
        DdlStatement::CreateSource(cs) => create_source(cs, metastore),
        DdlStatement::DropSource(ds) => drop_source(ds, metastore),
        DdlStatement::CreateFunction(cf) => create_function(cf, metastore, backends),
    }
}

fn create_source(cs: &CreateSourceStatement, metastore: &MetaStore) -> Result<DdlCommandResult> {
    if cs.kind == SourceKind::Table && cs.key.is_none() {
        return Ok(DdlCommandResult::fail(
            "Cannot define a TABLE without providing the KEY column name",
        ));
    }
    if let Some(key) = &cs.key {
        if !cs.columns.iter().any(|c| &c.name == key) {
            return Ok(DdlCommandResult::fail(format!(
                "KEY column {key} is not in the declared schema of {}",
                cs.name
            )));
        }
    }
    if metastore.get_source(&cs.name).is_some() && !cs.replace {
        return Ok(DdlCommandResult::fail(format!(
            "Source {} already exists",
            cs.name
        )));
    }

    let mut fields = Vec::with_capacity(cs.columns.len());
    for col in &cs.columns {
        fields.push(Field::new(&col.name, sql_type_to_arrow(&col.sql_type)?, true));
    }

    metastore.put_source(DataSource::new(
        &cs.name,
        Schema::new(fields),
        cs.key.clone(),
        cs.kind,
        &cs.topic,
    ));
    Ok(DdlCommandResult::ok(format!(
        "{} {} created",
        cs.kind, cs.name
    )))
}

fn drop_source(ds: &DropSourceStatement, metastore: &MetaStore) -> Result<DdlCommandResult> {
    match metastore.delete_source(&ds.name) {
        Ok(()) => Ok(DdlCommandResult::ok(format!("Source {} dropped", ds.name))),
        Err(CsqlError::NotFound(_)) => Ok(DdlCommandResult::fail(format!(
            "Source {} does not exist",
            ds.name
        ))),
        Err(e) => Err(e),
    }
}

/// CREATE FUNCTION:
/// 1. probe the body's executability in its declared language (fail fast);
/// 2. ensure the overload-set factory exists (idempotent);
/// 3. build the script-backed callable;
/// 4. register the signature, honoring the replace flag.
fn create_function(
    cf: &CreateFunctionStatement,
    metastore: &MetaStore,
    backends: &LanguageBackendRegistry,
) -> Result<DdlCommandResult> {
    let language = cf.language.to_ascii_lowercase();
    let backend = backends
        .get(&language)
        .ok_or_else(|| CsqlError::NotExecutable {
            language: language.clone(),
            reason: "no backend registered for this language".to_string(),
        })?;
    if !backend.probe(&cf.body) {
        return Err(CsqlError::NotExecutable {
            language,
            reason: "body failed the executability probe".to_string(),
        });
    }

    let mut arg_types = Vec::with_capacity(cf.args.len());
    let mut arg_names = Vec::with_capacity(cf.args.len());
    for arg in &cf.args {
        arg_types.push(sql_type_to_arrow(&arg.sql_type)?);
        arg_names.push(arg.name.clone());
    }
    let return_type = sql_type_to_arrow(&cf.return_type)?;

    let signature = FunctionSignature::new(&cf.name, arg_types, return_type).with_metadata(
        &cf.author,
        &cf.version,
        &cf.description,
    );

    let factory = metastore.functions().ensure_factory(&signature.name);
    let callable = Arc::new(ScriptFunction::new(
        signature.clone(),
        arg_names,
        language,
        &cf.body,
        backend,
    ));

    match factory.add(signature.clone(), callable, cf.replace) {
        Ok(()) => {
            tracing::info!(function = %signature.name, language = %cf.language, "registered function");
            Ok(DdlCommandResult::ok(format!(
                "Function {} registered",
                signature.name
            )))
        }
        Err(CsqlError::DuplicateDefinition(what)) => Ok(DdlCommandResult::fail(format!(
            "Cannot create {what}: it already exists"
        ))),
        Err(e) => Err(e),
    }
}

fn sql_type_to_arrow(sql_type: &str) -> Result<DataType> {
    match sql_type.trim().to_ascii_uppercase().as_str() {
        "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
        "INT" | "INTEGER" => Ok(DataType::Int32),
        "BIGINT" | "LONG" => Ok(DataType::Int64),
        "DOUBLE" => Ok(DataType::Float64),
        "VARCHAR" | "STRING" => Ok(DataType::Utf8),
        other => Err(CsqlError::InvalidConfig(format!(
            "unknown SQL type: {other}"
        ))),
    }
}
