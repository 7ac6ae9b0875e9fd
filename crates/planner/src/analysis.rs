//! The resolved, catalog-bound intermediate form of one statement.

use std::sync::Arc;

use arrow_schema::Schema;
use csql_catalog::{DataSource, SourceKind};

use crate::logical_plan::{AggExpr, Expr, JoinType};

/// One FROM-clause source, resolved against the catalog snapshot.
#[derive(Debug, Clone)]
pub struct AnalyzedSource {
    pub source: Arc<DataSource>,
    /// Alias used in the statement, or the source name when unaliased.
    pub alias: String,
}

/// Resolved key-equality join between the two FROM sources.
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    /// Plain field name on the left side.
    pub left_key: String,
    /// Plain field name on the right side.
    pub right_key: String,
}

/// Where the statement's output goes.
#[derive(Debug, Clone)]
pub struct SinkSpec {
    pub name: String,
    pub kind: SourceKind,
}

/// Per-statement resolved form, created fresh per compile and discarded after
/// planning.
///
/// Expressions are in "source coordinates" (indices into the concatenated
/// FROM schemas) except `select_exprs`, which for aggregating statements is
/// rewritten into coordinates over `agg_schema`.
#[derive(Debug)]
pub struct Analysis {
    pub sources: Vec<AnalyzedSource>,
    pub join: Option<JoinClause>,
    pub filter: Option<Expr>,
    pub select_exprs: Vec<(Expr, String)>,
    pub group_exprs: Vec<Expr>,
    pub aggr_exprs: Vec<(AggExpr, String)>,
    /// Schema of the aggregate operator's output (group column first, then
    /// one field per aggregate), when the statement aggregates.
    pub agg_schema: Option<Schema>,
    pub sink: SinkSpec,
    /// Resolved output schema in select-list order.
    pub schema: Schema,
    /// Resolved output key/partition field.
    pub key_field: Option<String>,
}

impl Analysis {
    pub fn is_aggregating(&self) -> bool {
        !self.aggr_exprs.is_empty() || !self.group_exprs.is_empty()
    }
}
