use nendb::pool::{EdgeRecord, NodeRecord};
use nendb::{Database, DbConfig, Value};
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> DbConfig {
    DbConfig {
        embedding_dim: 4,
        ..DbConfig::with_data_dir(dir)
    }
}

fn seeded(dir: &std::path::Path) -> Database {
    let db = Database::init(config(dir)).unwrap();
    db.insert_node(NodeRecord::new(1, 1)).unwrap();
    db.insert_node(NodeRecord::new(2, 1)).unwrap();
    db.insert_node(NodeRecord::new(3, 2)).unwrap();
    db.insert_edge(EdgeRecord::new(1, 2, 0)).unwrap();
    db.insert_edge(EdgeRecord::new(2, 3, 0)).unwrap();
    db
}

#[test]
fn snapshot_wipe_restore_reruns_identically() {
    let dir = tempdir().unwrap();
    let snap = dir.path().join("snap1");
    let db = seeded(dir.path());

    let query = "MATCH (a)-[r]->(b) WHERE a.kind = 1 RETURN a.id, b.id ORDER BY a.id, b.id";
    let before = db.execute(query).unwrap();

    db.snapshot(&snap).unwrap();
    db.clear().unwrap();
    assert_eq!(db.get_stats().memory.nodes.used, 0);

    db.restore_from_snapshot(&snap).unwrap();
    let after = db.execute(query).unwrap();
    assert_eq!(before, after);
    assert_eq!(
        before
            .rows()
            .map(|r| r.to_vec())
            .collect::<Vec<Vec<Value>>>(),
        vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(2), Value::Int(3)]
        ]
    );
}

#[test]
fn restore_onto_populated_database_fails() {
    let dir = tempdir().unwrap();
    let snap = dir.path().join("snap1");
    let db = seeded(dir.path());
    db.snapshot(&snap).unwrap();
    assert!(matches!(
        db.restore_from_snapshot(&snap).unwrap_err(),
        nendb::Error::Storage(nendb_storage::Error::NotEmpty)
    ));
}

#[test]
fn snapshot_restore_snapshot_is_byte_identical() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("snap1");
    let second = dir.path().join("snap2");
    let db = seeded(dir.path());

    db.snapshot(&first).unwrap();
    db.clear().unwrap();
    db.restore_from_snapshot(&first).unwrap();
    db.snapshot(&second).unwrap();

    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
}

#[test]
fn restored_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let snap = dir.path().join("snap1");
    {
        let db = seeded(dir.path());
        db.snapshot(&snap).unwrap();
        db.clear().unwrap();
        db.restore_from_snapshot(&snap).unwrap();
    }
    let db = Database::open(config(dir.path())).unwrap();
    assert_eq!(db.get_stats().memory.nodes.used, 3);
    assert_eq!(db.get_stats().memory.edges.used, 2);
}

#[test]
fn snapshot_cadence_keeps_replay_exact() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.snapshot_every_ops = 5;
    {
        let db = Database::init(cfg.clone()).unwrap();
        for id in 1..=17 {
            db.insert_node(NodeRecord::new(id, 0)).unwrap();
        }
        db.sync().unwrap();
    }
    let db = Database::open(cfg).unwrap();
    assert_eq!(db.get_stats().memory.nodes.used, 17);
}
