//! End-to-end Cypher execution against the real engine.

use nendb::pool::{EdgeRecord, NodeRecord};
use nendb::{Database, DbConfig, Value};
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> DbConfig {
    DbConfig {
        embedding_dim: 4,
        ..DbConfig::with_data_dir(dir)
    }
}

/// Nodes {1, kind 1}, {2, kind 1}, {3, kind 2}; edges 1→2 and 2→3.
fn seeded(dir: &std::path::Path) -> Database {
    let db = Database::init(config(dir)).unwrap();
    db.insert_node(NodeRecord::new(1, 1)).unwrap();
    db.insert_node(NodeRecord::new(2, 1)).unwrap();
    db.insert_node(NodeRecord::new(3, 2)).unwrap();
    db.insert_edge(EdgeRecord::new(1, 2, 0)).unwrap();
    db.insert_edge(EdgeRecord::new(2, 3, 0)).unwrap();
    db
}

fn int_rows(rs: &nendb::ResultSet) -> Vec<Vec<i64>> {
    rs.rows()
        .map(|row| {
            row.iter()
                .map(|v| match v {
                    Value::Int(i) => *i,
                    other => panic!("expected int, got {other:?}"),
                })
                .collect()
        })
        .collect()
}

#[test]
fn match_where_return_ordered() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let rows = db
        .execute("MATCH (a)-[r]->(b) WHERE a.kind = 1 RETURN a.id, b.id ORDER BY a.id, b.id")
        .unwrap();
    assert_eq!(int_rows(&rows), vec![vec![1, 2], vec![2, 3]]);
}

#[test]
fn rerunning_a_read_query_is_stable() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let q = "MATCH (a)-[r]->(b) RETURN a.id, b.id ORDER BY a.id, b.id";
    assert_eq!(db.execute(q).unwrap(), db.execute(q).unwrap());
}

#[test]
fn registered_label_names_resolve() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    db.register_kind("User", 1);
    db.register_kind("Group", 2);
    db.register_edge_label("KNOWS", 0);

    let rows = db
        .execute("MATCH (a:User)-[:KNOWS]->(b:Group) RETURN a.id, b.id")
        .unwrap();
    assert_eq!(int_rows(&rows), vec![vec![2, 3]]);

    let err = db.execute("MATCH (n:Missing) RETURN n").unwrap_err();
    assert!(matches!(err, nendb::Error::Query(_)));
}

#[test]
fn create_merge_set_delete_pipeline() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();

    db.execute("CREATE (a:1 {id: 10, name: 'ada'})-[:5]->(b:1 {id: 20})")
        .unwrap();
    assert_eq!(db.get_stats().memory.nodes.used, 2);
    assert_eq!(db.get_stats().memory.edges.used, 1);

    // MERGE matches the existing node instead of duplicating it.
    db.execute("MERGE (n:1 {id: 10})").unwrap();
    assert_eq!(db.get_stats().memory.nodes.used, 2);
    db.execute("MERGE (n:1 {id: 30})").unwrap();
    assert_eq!(db.get_stats().memory.nodes.used, 3);

    db.execute("MATCH (n {id: 10}) SET n.name = 'grace'").unwrap();
    assert_eq!(
        db.node_prop(10, "name"),
        Some(nendb::PropValue::Text("grace".into()))
    );
    db.execute("MATCH (n {id: 10}) REMOVE n.name").unwrap();
    assert_eq!(db.node_prop(10, "name"), None);

    db.execute("MATCH (n {id: 10}) DETACH DELETE n").unwrap();
    assert!(db.lookup_node(10).is_none());
    assert_eq!(db.get_stats().memory.edges.used, 0);
}

#[test]
fn non_detach_delete_with_edges_fails() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let err = db.execute("MATCH (n {id: 2}) DELETE n").unwrap_err();
    assert!(matches!(err, nendb::Error::Query(_)));
    // Nothing was lost.
    assert_eq!(db.get_stats().memory.nodes.used, 3);
}

#[test]
fn optional_match_and_unwind() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());

    let rows = db
        .execute("MATCH (a) OPTIONAL MATCH (a)-[r]->(b) RETURN a.id, b.id ORDER BY a.id")
        .unwrap();
    let all: Vec<_> = rows.rows().map(|r| r.to_vec()).collect();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2], vec![Value::Int(3), Value::Null]);

    let rows = db.execute("UNWIND [2, 1] AS x RETURN x ORDER BY x").unwrap();
    assert_eq!(int_rows(&rows), vec![vec![1], vec![2]]);
}

#[test]
fn with_chains_parts() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let rows = db
        .execute("MATCH (n) WITH n.kind AS k WHERE k = 1 RETURN k ORDER BY k")
        .unwrap();
    assert_eq!(rows.columns, vec!["k".to_string()]);
    assert_eq!(int_rows(&rows), vec![vec![1], vec![1]]);
}

#[test]
fn aggregates_and_distinct() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());

    let rows = db
        .execute("MATCH (n) RETURN n.kind, count(*) ORDER BY n.kind")
        .unwrap();
    assert_eq!(int_rows(&rows), vec![vec![1, 2], vec![2, 1]]);

    let rows = db.execute("MATCH (n) RETURN DISTINCT n.kind ORDER BY n.kind").unwrap();
    assert_eq!(int_rows(&rows), vec![vec![1], vec![2]]);
}

#[test]
fn order_skip_limit_boundary() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let rows = db
        .execute("MATCH (n) RETURN n ORDER BY n.kind DESC SKIP 1 LIMIT 0")
        .unwrap();
    assert_eq!(rows.len(), 0);
}

#[test]
fn parse_errors_leave_state_unchanged() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let before = db.get_stats();
    let err = db.execute("CREATE (n {id: )").unwrap_err();
    assert!(matches!(
        err,
        nendb::Error::Query(nendb::query::Error::Parse(_))
    ));
    assert_eq!(db.get_stats(), before);
}

#[test]
fn variable_length_is_parsed_but_unsupported() {
    let dir = tempdir().unwrap();
    let db = seeded(dir.path());
    let err = db.execute("MATCH (a)-[*1..2]->(b) RETURN a").unwrap_err();
    assert!(matches!(
        err,
        nendb::Error::Query(nendb::query::Error::Unsupported(_))
    ));
}
