use std::time::{SystemTime, UNIX_EPOCH};

use csql_common::{CsqlError, EngineConfig, QueryId, Result};

use crate::logical_plan::{JoinType, LogicalPlan};
use crate::physical_plan::{
    FilterRowsNode, KeyedAggregateNode, KeyedJoinNode, MapValuesNode, OutputDescriptor,
    RepartitionNode, StreamsNode, StreamsTopology, TopicSinkNode, TopicSourceNode,
};

#[derive(Debug, Clone)]
pub struct PhysicalPlannerConfig {
    /// Prefix for generated application ids.
    pub app_id_prefix: String,
    /// Partition count for generated sink topics.
    pub sink_partitions: u32,
    /// Suffix appended to state-store names.
    pub state_store_suffix: String,
    /// Offset reset policy handed to the substrate.
    pub auto_offset_reset: String,
}

impl Default for PhysicalPlannerConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PhysicalPlannerConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            app_id_prefix: cfg.app_id_prefix.clone(),
            sink_partitions: cfg.sink_partitions,
            state_store_suffix: cfg.state_store_suffix.clone(),
            auto_offset_reset: cfg.auto_offset_reset.clone(),
        }
    }
}

/// Lowers a logical plan onto the streaming substrate's primitives.
///
/// Contracts:
/// - the logical tree is walked exactly once and logical semantics are
///   preserved;
/// - a [`RepartitionNode`] is inserted whenever an operator needs a key the
///   incoming stream is not partitioned by (the substrate partitions by key);
/// - exactly one [`OutputDescriptor`] is produced per statement; its sink
///   topic is derived from the query id plus a millisecond timestamp so names
///   cannot collide across restarts;
/// - shapes with no lowering fail with `UnsupportedOperator` and leave no
///   partial topology behind.
#[derive(Debug)]
pub struct PhysicalPlanBuilder {
    cfg: PhysicalPlannerConfig,
    store_seq: u32,
}

impl PhysicalPlanBuilder {
    pub fn new(cfg: PhysicalPlannerConfig) -> Self {
        Self { cfg, store_seq: 0 }
    }

    pub fn build(
        &mut self,
        query_id: QueryId,
        logical: &LogicalPlan,
    ) -> Result<(StreamsTopology, OutputDescriptor)> {
        let LogicalPlan::Sink {
            name,
            kind,
            schema,
            key_field,
            input,
        } = logical
        else {
            return Err(CsqlError::Planning(
                "logical plan must terminate in a sink".to_string(),
            ));
        };

        self.store_seq = 0;
        let millis = unix_millis();
        let application_id = format!("{}{}-{}", self.cfg.app_id_prefix, query_id, millis);
        let topic = format!("{}-{}-{}", name, query_id, millis);

        let (node, _key) = self.lower(input)?;
        let root = StreamsNode::TopicSink(TopicSinkNode {
            topic: topic.clone(),
            partitions: self.cfg.sink_partitions,
            schema: schema.clone(),
            key_field: key_field.clone(),
            input: Box::new(node),
        });

        let descriptor = OutputDescriptor {
            query_id,
            name: name.clone(),
            kind: *kind,
            schema: schema.clone(),
            key_field: key_field.clone(),
            topic,
        };

        tracing::debug!(
            query_id = %query_id,
            application_id = %application_id,
            sink = %descriptor.name,
            topic = %descriptor.topic,
            "lowered logical plan to streams topology"
        );

        Ok((
            StreamsTopology {
                application_id,
                auto_offset_reset: self.cfg.auto_offset_reset.clone(),
                root,
            },
            descriptor,
        ))
    }

    /// Lower one operator, returning the node plus the field the stream is
    /// partitioned by after it.
    fn lower(&mut self, plan: &LogicalPlan) -> Result<(StreamsNode, Option<String>)> {
        match plan {
            LogicalPlan::SourceScan {
                source,
                topic,
                kind,
                schema,
                key_field,
            } => Ok((
                StreamsNode::TopicSource(TopicSourceNode {
                    source: source.clone(),
                    topic: topic.clone(),
                    kind: *kind,
                    schema: schema.clone(),
                    key_field: key_field.clone(),
                }),
                key_field.clone(),
            )),

            LogicalPlan::Filter { predicate, input } => {
                let (child, key) = self.lower(input)?;
                Ok((
                    StreamsNode::FilterRows(FilterRowsNode {
                        predicate: predicate.clone(),
                        input: Box::new(child),
                    }),
                    key,
                ))
            }

            LogicalPlan::Project {
                exprs,
                schema,
                input,
            } => {
                // Value-only transform: the partitioning key is untouched.
                let (child, key) = self.lower(input)?;
                Ok((
                    StreamsNode::MapValues(MapValuesNode {
                        exprs: exprs.clone(),
                        schema: schema.clone(),
                        input: Box::new(child),
                    }),
                    key,
                ))
            }

            LogicalPlan::Aggregate {
                aggr_exprs,
                schema,
                key_field,
                input,
                ..
            } => {
                let group_key = key_field.clone().ok_or_else(|| {
                    CsqlError::Planning("aggregate is missing its grouping key".to_string())
                })?;
                let (child, key) = self.lower(input)?;
                let child = self.rekey_if_needed(child, key.as_deref(), &group_key);
                let state_store = self.next_state_store();
                Ok((
                    StreamsNode::KeyedAggregate(KeyedAggregateNode {
                        key_field: group_key.clone(),
                        aggr_exprs: aggr_exprs.clone(),
                        schema: schema.clone(),
                        state_store,
                        input: Box::new(child),
                    }),
                    Some(group_key),
                ))
            }

            LogicalPlan::Join {
                left,
                right,
                on,
                join_type,
                schema,
                key_field,
            } => {
                if *join_type == JoinType::Full {
                    return Err(CsqlError::UnsupportedOperator(
                        "FULL OUTER join has no streaming lowering".to_string(),
                    ));
                }
                let (l, lkey) = self.lower(left)?;
                let (r, rkey) = self.lower(right)?;
                let l = self.rekey_if_needed(l, lkey.as_deref(), &on.0);
                let r = self.rekey_if_needed(r, rkey.as_deref(), &on.1);
                Ok((
                    StreamsNode::KeyedJoin(KeyedJoinNode {
                        left: Box::new(l),
                        right: Box::new(r),
                        left_key: on.0.clone(),
                        right_key: on.1.clone(),
                        join_type: *join_type,
                        schema: schema.clone(),
                    }),
                    key_field.clone(),
                ))
            }

            LogicalPlan::Sink { .. } => Err(CsqlError::Planning(
                "sink must be the root of the logical plan".to_string(),
            )),
        }
    }

    fn rekey_if_needed(
        &self,
        node: StreamsNode,
        current_key: Option<&str>,
        wanted_key: &str,
    ) -> StreamsNode {
        if current_key == Some(wanted_key) {
            return node;
        }
        StreamsNode::Repartition(RepartitionNode {
            key_field: wanted_key.to_string(),
            partitions: self.cfg.sink_partitions,
            input: Box::new(node),
        })
    }

    fn next_state_store(&mut self) -> String {
        let name = format!("agg-{}{}", self.store_seq, self.cfg.state_store_suffix);
        self.store_seq += 1;
        name
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
