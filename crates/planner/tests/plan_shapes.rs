use arrow_schema::{DataType, Field, Schema};
use csql_catalog::{DataSource, MetaStore, SourceKind};
use csql_planner::{Analyzer, LogicalPlan, LogicalPlanner};

fn metastore() -> MetaStore {
    let store = MetaStore::new();
    store.put_source(DataSource::new(
        "pageviews",
        Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("page", DataType::Utf8, true),
            Field::new("duration_ms", DataType::Int64, true),
        ]),
        Some("user_id".to_string()),
        SourceKind::Stream,
        "pageviews",
    ));
    store.put_source(DataSource::new(
        "users",
        Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("region", DataType::Utf8, true),
        ]),
        Some("user_id".to_string()),
        SourceKind::Table,
        "users",
    ));
    store
}

fn plan(sql: &str) -> LogicalPlan {
    let store = metastore();
    let query = csql_sql::parse_single_query(sql).unwrap();
    let analysis = Analyzer::new().analyze(&query, &store, "out").unwrap();
    LogicalPlanner::new().build_plan(&analysis).unwrap()
}

#[test]
fn select_builds_scan_project_sink() {
    let p = plan("SELECT user_id, page FROM pageviews");

    let LogicalPlan::Sink { input, key_field, .. } = &p else {
        panic!("expected sink at root");
    };
    assert_eq!(key_field.as_deref(), Some("user_id"));

    let LogicalPlan::Project { input, schema, .. } = input.as_ref() else {
        panic!("expected projection under sink");
    };
    assert_eq!(schema.fields().len(), 2);
    assert!(matches!(input.as_ref(), LogicalPlan::SourceScan { .. }));
}

#[test]
fn where_filter_sits_directly_above_the_scan() {
    let p = plan("SELECT page FROM pageviews WHERE duration_ms > 1000");

    let LogicalPlan::Sink { input, .. } = &p else {
        panic!("expected sink at root");
    };
    let LogicalPlan::Project { input, .. } = input.as_ref() else {
        panic!("expected projection under sink");
    };
    let LogicalPlan::Filter { input, .. } = input.as_ref() else {
        panic!("expected filter under projection");
    };
    assert!(matches!(input.as_ref(), LogicalPlan::SourceScan { .. }));
}

#[test]
fn group_by_inserts_aggregate_below_projection() {
    let p = plan("SELECT page, COUNT(*) AS views FROM pageviews GROUP BY page");

    let LogicalPlan::Sink { input, kind, key_field, .. } = &p else {
        panic!("expected sink at root");
    };
    assert_eq!(*kind, SourceKind::Table);
    assert_eq!(key_field.as_deref(), Some("page"));

    let LogicalPlan::Project { input, .. } = input.as_ref() else {
        panic!("expected projection under sink");
    };
    let LogicalPlan::Aggregate { schema, key_field, .. } = input.as_ref() else {
        panic!("expected aggregate under projection");
    };
    assert_eq!(key_field.as_deref(), Some("page"));
    assert_eq!(schema.field(0).name(), "page");
    assert_eq!(schema.field(1).name(), "views");
}

#[test]
fn join_is_left_deep_in_statement_order() {
    let p = plan(
        "SELECT pageviews.page, users.region FROM pageviews \
         JOIN users ON pageviews.user_id = users.user_id",
    );

    let LogicalPlan::Sink { input, .. } = &p else {
        panic!("expected sink at root");
    };
    let LogicalPlan::Project { input, .. } = input.as_ref() else {
        panic!("expected projection under sink");
    };
    let LogicalPlan::Join { left, right, on, key_field, schema, .. } = input.as_ref() else {
        panic!("expected join under projection");
    };
    assert_eq!(on, &("user_id".to_string(), "user_id".to_string()));
    assert_eq!(key_field.as_deref(), Some("user_id"));
    // Join schema is left fields then right fields.
    assert_eq!(schema.fields().len(), 5);
    let LogicalPlan::SourceScan { source, .. } = left.as_ref() else {
        panic!("expected scan on the left");
    };
    assert_eq!(source, "pageviews");
    let LogicalPlan::SourceScan { source, .. } = right.as_ref() else {
        panic!("expected scan on the right");
    };
    assert_eq!(source, "users");
}

#[test]
fn every_node_schema_is_fixed_bottom_up() {
    let p = plan("SELECT page, COUNT(*) AS views FROM pageviews GROUP BY page");
    // Walking children never changes the schema a parent reported.
    fn walk(n: &LogicalPlan) {
        let before = n.schema().clone();
        for c in n.children() {
            walk(c);
        }
        assert_eq!(&before, n.schema());
    }
    walk(&p);
}

#[test]
fn logical_plan_is_serializable() {
    let p = plan("SELECT user_id, page FROM pageviews WHERE duration_ms > 1000");
    let s = serde_json::to_string(&p).unwrap();
    let back: LogicalPlan = serde_json::from_str(&s).unwrap();
    assert_eq!(p.schema(), back.schema());
}
