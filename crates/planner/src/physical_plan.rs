use arrow_schema::Schema;
use serde::{Deserialize, Serialize};

use csql_catalog::SourceKind;
use csql_common::QueryId;

use crate::logical_plan::{AggExpr, Expr, JoinType};

/// The streams operator graph handed to the execution substrate.
///
/// Nodes map one-to-one onto substrate primitives: stateless transforms,
/// explicit repartitions, stateful keyed aggregation, keyed joins, and sink
/// writes. The substrate treats the graph as opaque and runnable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamsNode {
    /// Consume a topic as a record stream.
    TopicSource(TopicSourceNode),
    /// Stateless row filter.
    FilterRows(FilterRowsNode),
    /// Stateless per-row projection.
    MapValues(MapValuesNode),
    /// Explicit rekey boundary; the substrate partitions by key, so every key
    /// change must pass through one of these.
    Repartition(RepartitionNode),
    /// Stateful per-key aggregation.
    KeyedAggregate(KeyedAggregateNode),
    /// Keyed two-input join.
    KeyedJoin(KeyedJoinNode),
    /// Sink write into a topic.
    TopicSink(TopicSinkNode),
}

impl StreamsNode {
    /// Direct child operators.
    pub fn children(&self) -> Vec<&StreamsNode> {
        match self {
            StreamsNode::TopicSource(_) => vec![],
            StreamsNode::FilterRows(x) => vec![x.input.as_ref()],
            StreamsNode::MapValues(x) => vec![x.input.as_ref()],
            StreamsNode::Repartition(x) => vec![x.input.as_ref()],
            StreamsNode::KeyedAggregate(x) => vec![x.input.as_ref()],
            StreamsNode::KeyedJoin(x) => vec![x.left.as_ref(), x.right.as_ref()],
            StreamsNode::TopicSink(x) => vec![x.input.as_ref()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSourceNode {
    /// Catalog name of the source.
    pub source: String,
    /// Physical backing topic.
    pub topic: String,
    pub kind: SourceKind,
    pub schema: Schema,
    pub key_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRowsNode {
    pub predicate: Expr,
    pub input: Box<StreamsNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapValuesNode {
    /// `(expr, output_name)` pairs in output order.
    pub exprs: Vec<(Expr, String)>,
    pub schema: Schema,
    pub input: Box<StreamsNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepartitionNode {
    /// Field the stream is rekeyed by.
    pub key_field: String,
    pub partitions: u32,
    pub input: Box<StreamsNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedAggregateNode {
    /// Grouping column; the stream must already be keyed by it.
    pub key_field: String,
    pub aggr_exprs: Vec<(AggExpr, String)>,
    pub schema: Schema,
    /// Backing state store for per-key accumulators.
    pub state_store: String,
    pub input: Box<StreamsNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedJoinNode {
    pub left: Box<StreamsNode>,
    pub right: Box<StreamsNode>,
    pub left_key: String,
    pub right_key: String,
    pub join_type: JoinType,
    pub schema: Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSinkNode {
    pub topic: String,
    pub partitions: u32,
    pub schema: Schema,
    pub key_field: Option<String>,
    pub input: Box<StreamsNode>,
}

/// The lowered, runnable plan for one statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsTopology {
    /// Substrate application id, unique per compile.
    pub application_id: String,
    /// Offset reset policy for new consumer groups.
    pub auto_offset_reset: String,
    pub root: StreamsNode,
}

/// Identity, schema, and key metadata of a compiled statement's output.
///
/// Registered into the catalog once the query starts, so later statements can
/// reference the output by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub query_id: QueryId,
    pub name: String,
    pub kind: SourceKind,
    pub schema: Schema,
    pub key_field: Option<String>,
    /// Physical sink topic, unique across restarts.
    pub topic: String,
}
