use arrow_schema::Schema;

use csql_common::{CsqlError, Result};

use crate::analysis::Analysis;
use crate::logical_plan::{Expr, LogicalPlan};

/// Builds the logical operator tree from a resolved [`Analysis`].
///
/// Contracts:
/// - the tree is built bottom-up: scans, then the join, then the filter, then
///   the aggregate, then the projection, terminating in exactly one sink;
/// - every node's schema and key field are fixed at build time from its
///   inputs, so no node can be evaluated out of dependency order;
/// - join order is statement order (left-deep) and the WHERE predicate lands
///   in a single filter directly above the topmost scan/join, below any
///   aggregate.
#[derive(Debug, Default)]
pub struct LogicalPlanner;

impl LogicalPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn build_plan(&self, analysis: &Analysis) -> Result<LogicalPlan> {
        let mut node = self.scan(analysis, 0)?;

        if let Some(join) = &analysis.join {
            let right = self.scan(analysis, 1)?;
            let mut fields: Vec<_> = node.schema().fields().iter().map(|f| f.as_ref().clone()).collect();
            fields.extend(right.schema().fields().iter().map(|f| f.as_ref().clone()));
            let schema = Schema::new(fields);
            node = LogicalPlan::Join {
                left: Box::new(node),
                right: Box::new(right),
                on: (join.left_key.clone(), join.right_key.clone()),
                join_type: join.join_type,
                schema,
                key_field: Some(join.left_key.clone()),
            };
        }

        if let Some(predicate) = &analysis.filter {
            node = LogicalPlan::Filter {
                predicate: predicate.clone(),
                input: Box::new(node),
            };
        }

        if analysis.is_aggregating() {
            let schema = analysis.agg_schema.clone().ok_or_else(|| {
                CsqlError::Planning("aggregating analysis is missing its aggregate schema".to_string())
            })?;
            let key_field = match analysis.group_exprs.first() {
                Some(Expr::ColumnRef { name, .. }) => Some(name.clone()),
                _ => {
                    return Err(CsqlError::Planning(
                        "aggregate plan requires a resolved grouping column".to_string(),
                    ))
                }
            };
            node = LogicalPlan::Aggregate {
                group_exprs: analysis.group_exprs.clone(),
                aggr_exprs: analysis.aggr_exprs.clone(),
                schema,
                key_field,
                input: Box::new(node),
            };
        }

        node = LogicalPlan::Project {
            exprs: analysis.select_exprs.clone(),
            schema: analysis.schema.clone(),
            input: Box::new(node),
        };

        Ok(LogicalPlan::Sink {
            name: analysis.sink.name.clone(),
            kind: analysis.sink.kind,
            schema: analysis.schema.clone(),
            key_field: analysis.key_field.clone(),
            input: Box::new(node),
        })
    }

    fn scan(&self, analysis: &Analysis, idx: usize) -> Result<LogicalPlan> {
        let analyzed = analysis
            .sources
            .get(idx)
            .ok_or_else(|| CsqlError::Planning(format!("missing FROM source {idx}")))?;
        let source = &analyzed.source;
        Ok(LogicalPlan::SourceScan {
            source: source.name.clone(),
            topic: source.topic.clone(),
            kind: source.kind,
            schema: source.schema.clone(),
            key_field: source.key_field.clone(),
        })
    }
}
