use nendb::pool::{EdgeRecord, NodeRecord};
use nendb::{Database, DbConfig};
use nendb_api::Direction;
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> DbConfig {
    DbConfig {
        embedding_dim: 4,
        ..DbConfig::with_data_dir(dir)
    }
}

#[test]
fn insert_then_lookup_with_stats() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();

    let mut rec = NodeRecord::new(1, 7);
    rec.props = [0u8; nendb::NODE_PROPS_LEN];
    db.insert_node(rec).unwrap();

    let stats = db.get_stats();
    assert_eq!(stats.memory.nodes.used, 1);
    assert_eq!(stats.wal.entries_written, 1);
    assert_eq!(db.lookup_node(1).unwrap().kind, 7);
    assert!(db.lookup_node(99).is_none());
}

#[test]
fn insert_delete_roundtrip() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();
    db.insert_node(NodeRecord::new(1, 0)).unwrap();
    db.delete_node(1).unwrap();
    assert!(db.lookup_node(1).is_none());
    let stats = db.get_stats();
    assert_eq!(stats.memory.nodes.used, 0);
    assert_eq!(
        stats.memory.nodes.used + stats.memory.nodes.free,
        stats.memory.nodes.capacity
    );
}

#[test]
fn edge_with_endpoints_yields_neighbors_both_ways() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();
    db.insert_node(NodeRecord::new(1, 0)).unwrap();
    db.insert_node(NodeRecord::new(2, 0)).unwrap();
    db.insert_edge(EdgeRecord::new(1, 2, 5)).unwrap();

    let out = db.neighbors(1, Direction::Outgoing, None);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, 2);
    assert_eq!(out[0].label, 5);

    let inc = db.neighbors(2, Direction::Incoming, None);
    assert_eq!(inc.len(), 1);
    assert_eq!(inc[0].from, 1);

    assert!(db.neighbors(1, Direction::Incoming, None).is_empty());
}

#[test]
fn self_loop_visible_in_both_directions() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();
    db.insert_node(NodeRecord::new(1, 0)).unwrap();
    db.insert_edge(EdgeRecord::new(1, 1, 9)).unwrap();
    assert_eq!(db.neighbors(1, Direction::Outgoing, None).len(), 1);
    assert_eq!(db.neighbors(1, Direction::Incoming, None).len(), 1);
}

#[test]
fn pool_capacity_boundary() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.node_capacity = 8;
    let db = Database::init(cfg).unwrap();
    for id in 1..=8 {
        db.insert_node(NodeRecord::new(id, 0)).unwrap();
    }
    let err = db.insert_node(NodeRecord::new(9, 0)).unwrap_err();
    assert!(matches!(
        err,
        nendb::Error::Storage(nendb_storage::Error::PoolExhausted("nodes"))
    ));
}

#[test]
fn node_props_and_embeddings() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();
    db.insert_node(NodeRecord::new(1, 0)).unwrap();

    db.set_node_prop(1, "name", nendb_api::PropValue::Text("ada".into()))
        .unwrap();
    assert_eq!(
        db.node_prop(1, "name"),
        Some(nendb_api::PropValue::Text("ada".into()))
    );

    db.upsert_embedding(1, &[0.5, 0.25, -1.0, 2.0]).unwrap();
    assert_eq!(db.get_embedding(1).unwrap(), vec![0.5, 0.25, -1.0, 2.0]);

    db.detach_delete_node(1).unwrap();
    assert!(db.get_embedding(1).is_none());
}

#[test]
fn transactions_track_sets() {
    let dir = tempdir().unwrap();
    let db = Database::init(config(dir.path())).unwrap();
    let mut txn = db.begin_transaction(nendb::IsolationLevel::ReadCommitted);
    txn.record_read(1);
    txn.record_write(2);
    txn.commit().unwrap();
    assert_eq!(txn.state(), nendb::txn::TxnState::Committed);
    assert!(txn.read_set().contains(&1));
    assert!(txn.write_set().contains(&2));
}
