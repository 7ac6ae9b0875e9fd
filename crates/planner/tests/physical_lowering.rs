use arrow_schema::{DataType, Field, Schema};
use csql_catalog::{DataSource, MetaStore, SourceKind};
use csql_common::{CsqlError, QueryId};
use csql_planner::{
    Analyzer, LogicalPlanner, PhysicalPlanBuilder, PhysicalPlannerConfig, StreamsNode,
    StreamsTopology,
};

fn metastore() -> MetaStore {
    let store = MetaStore::new();
    store.put_source(DataSource::new(
        "clicks",
        Schema::new(vec![
            Field::new("session", DataType::Utf8, false),
            Field::new("url", DataType::Utf8, true),
            Field::new("latency", DataType::Int64, true),
        ]),
        Some("session".to_string()),
        SourceKind::Stream,
        "clicks",
    ));
    store.put_source(DataSource::new(
        "sessions",
        Schema::new(vec![
            Field::new("session", DataType::Utf8, false),
            Field::new("browser", DataType::Utf8, true),
        ]),
        Some("session".to_string()),
        SourceKind::Table,
        "sessions",
    ));
    store
}

fn lower(sql: &str) -> csql_common::Result<(StreamsTopology, csql_planner::OutputDescriptor)> {
    let store = metastore();
    let query = csql_sql::parse_single_query(sql).unwrap();
    let analysis = Analyzer::new().analyze(&query, &store, "out")?;
    let logical = LogicalPlanner::new().build_plan(&analysis)?;
    PhysicalPlanBuilder::new(PhysicalPlannerConfig::default()).build(QueryId(7), &logical)
}

fn find_repartitions(node: &StreamsNode, out: &mut Vec<String>) {
    if let StreamsNode::Repartition(r) = node {
        out.push(r.key_field.clone());
    }
    for c in node.children() {
        find_repartitions(c, out);
    }
}

#[test]
fn aggregate_on_key_column_needs_no_repartition() {
    let (topology, output) = lower(
        "SELECT session, COUNT(*) AS hits FROM clicks GROUP BY session",
    )
    .unwrap();
    let mut rekeys = vec![];
    find_repartitions(&topology.root, &mut rekeys);
    assert!(rekeys.is_empty(), "unexpected rekeys: {rekeys:?}");
    assert_eq!(output.key_field.as_deref(), Some("session"));
    assert_eq!(output.kind, SourceKind::Table);
}

#[test]
fn aggregate_on_non_key_column_rekeys_explicitly() {
    let (topology, _) =
        lower("SELECT url, COUNT(*) AS hits FROM clicks GROUP BY url").unwrap();
    let mut rekeys = vec![];
    find_repartitions(&topology.root, &mut rekeys);
    assert_eq!(rekeys, vec!["url".to_string()]);
}

#[test]
fn aggregate_names_a_state_store() {
    let (topology, _) =
        lower("SELECT url, COUNT(*) AS hits FROM clicks GROUP BY url").unwrap();
    fn find_store(node: &StreamsNode) -> Option<String> {
        if let StreamsNode::KeyedAggregate(a) = node {
            return Some(a.state_store.clone());
        }
        node.children().into_iter().find_map(find_store)
    }
    let store = find_store(&topology.root).expect("keyed aggregate in topology");
    assert!(store.ends_with("_states"), "store={store}");
}

#[test]
fn join_on_keys_lowers_without_rekey() {
    let (topology, _) = lower(
        "SELECT clicks.url, sessions.browser FROM clicks \
         JOIN sessions ON clicks.session = sessions.session",
    )
    .unwrap();
    let mut rekeys = vec![];
    find_repartitions(&topology.root, &mut rekeys);
    assert!(rekeys.is_empty(), "unexpected rekeys: {rekeys:?}");
}

#[test]
fn full_outer_join_has_no_lowering() {
    let err = lower(
        "SELECT clicks.url, sessions.browser FROM clicks \
         FULL OUTER JOIN sessions ON clicks.session = sessions.session",
    )
    .unwrap_err();
    assert!(matches!(err, CsqlError::UnsupportedOperator(_)));
}

#[test]
fn sink_topic_is_derived_from_query_id() {
    let (_, output) =
        lower("SELECT session, url FROM clicks").unwrap();
    assert_eq!(output.query_id, QueryId(7));
    assert!(output.topic.starts_with("out-7-"), "topic={}", output.topic);
    assert_eq!(output.name, "out");
}

#[test]
fn topology_is_serializable() {
    let (topology, _) =
        lower("SELECT url, COUNT(*) AS hits FROM clicks GROUP BY url").unwrap();
    let s = serde_json::to_string(&topology).unwrap();
    let _back: StreamsTopology = serde_json::from_str(&s).unwrap();
}
