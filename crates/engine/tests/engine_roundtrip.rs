use std::sync::Arc;

use csql_catalog::SourceKind;
use csql_common::EngineConfig;
use csql_engine::{
    ColumnDef, CreateSourceStatement, DdlStatement, DropSourceStatement, EmbeddedSubstrate,
    QueryEngine, QueryState,
};

fn engine() -> (QueryEngine, Arc<EmbeddedSubstrate>) {
    let substrate = Arc::new(EmbeddedSubstrate::new());
    let engine = QueryEngine::new(EngineConfig::default(), substrate.clone());
    let res = engine
        .execute_ddl(&DdlStatement::CreateSource(CreateSourceStatement {
            name: "pageviews".to_string(),
            columns: vec![
                ColumnDef::new("user_id", "BIGINT"),
                ColumnDef::new("page", "VARCHAR"),
                ColumnDef::new("duration_ms", "BIGINT"),
            ],
            key: Some("user_id".to_string()),
            topic: "pageviews".to_string(),
            kind: SourceKind::Stream,
            replace: false,
        }))
        .unwrap();
    assert!(res.success, "{}", res.message);
    (engine, substrate)
}

#[test]
fn query_output_becomes_a_queryable_source() {
    let (engine, substrate) = engine();

    let id = engine
        .execute_sql("SELECT user_id, page FROM pageviews WHERE duration_ms > 500")
        .unwrap();
    assert_eq!(engine.state(id), Some(QueryState::Started));
    assert_eq!(substrate.started_applications().len(), 1);

    // The output registered under its generated name with schema and key.
    let output = engine.output(id).unwrap();
    let registered = engine.metastore().get_source(&output.name).unwrap();
    assert_eq!(registered.schema, output.schema);
    assert_eq!(registered.key_field.as_deref(), Some("user_id"));

    // A second statement can read the first one's output by name.
    let second = engine
        .execute_sql(&format!("SELECT user_id FROM {}", output.name))
        .unwrap();
    assert_eq!(engine.state(second), Some(QueryState::Started));
    assert_eq!(substrate.started_applications().len(), 2);
}

#[test]
fn ctas_publishes_a_table_under_the_given_name() {
    let (engine, _) = engine();

    engine
        .execute_sql(
            "CREATE TABLE page_counts AS \
             SELECT page, COUNT(*) AS views FROM pageviews GROUP BY page",
        )
        .unwrap();

    let registered = engine.metastore().get_source("page_counts").unwrap();
    assert_eq!(registered.kind, SourceKind::Table);
    assert_eq!(registered.key_field.as_deref(), Some("page"));
    assert_eq!(registered.schema.field(1).name(), "views");
}

#[test]
fn failed_compile_commits_nothing() {
    let (engine, substrate) = engine();
    let before = engine.metastore().source_names();

    let err = engine.execute_sql("SELECT x FROM missing_source").unwrap_err();
    assert!(err.to_string().contains("missing_source"));

    assert_eq!(engine.metastore().source_names(), before);
    assert!(substrate.started_applications().is_empty());
}

#[test]
fn terminate_stops_but_catalog_removal_is_explicit_ddl() {
    let (engine, _) = engine();
    let id = engine.execute_sql("SELECT user_id FROM pageviews").unwrap();
    let output = engine.output(id).unwrap();

    engine.terminate(id).unwrap();
    assert_eq!(engine.state(id), None);

    // The output is still in the catalog until dropped explicitly.
    assert!(engine.metastore().get_source(&output.name).is_some());
    let res = engine
        .execute_ddl(&DdlStatement::DropSource(DropSourceStatement {
            name: output.name.clone(),
        }))
        .unwrap();
    assert!(res.success);
    assert!(engine.metastore().get_source(&output.name).is_none());
}
