//! # NenDB
//!
//! An embedded graph database built on statically-allocated memory pools,
//! a write-ahead log for durability, and a Cypher-subset query frontend.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use nendb::{Database, DbConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let db = Database::init(DbConfig::with_data_dir("./data"))?;
//!
//!     db.execute("CREATE (a {id: 1, kind: 7})-[:5]->(b {id: 2})")?;
//!     db.sync()?;
//!
//!     let rows = db.execute("MATCH (a)-[r]->(b) RETURN a.id, b.id")?;
//!     for row in rows.rows() {
//!         println!("{row:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Core concepts
//!
//! - [`Database`]: the entry point. Owns the pools, the WAL, the snapshot
//!   policy, and the label registries. Safe to share across threads; every
//!   mutation serializes through a single reader-biased write lock.
//! - [`execute`](Database::execute): the Cypher subset
//!   (MATCH / OPTIONAL MATCH / WHERE / CREATE / MERGE / SET / REMOVE /
//!   DELETE / UNWIND / WITH / RETURN with ORDER BY, SKIP, LIMIT).
//! - Direct pool access (`insert_node`, `neighbors`, ...) for hosts that
//!   bypass the query layer.
//!
//! Pool capacities are fixed at open time; see [`DbConfig`]. Durability
//! follows the WAL contract: a mutation survives a crash once a
//! [`sync`](Database::sync) has happened after it.

mod error;

use nendb_query::executor::GraphWrite;
use nendb_storage::engine::GraphDb;
use nendb_storage::pool::{EdgeRecord, EdgeView, NodeRecord, NodeView};
use nendb_storage::property;
use nendb_storage::sync::RwLock;
use std::collections::HashMap;
use std::path::Path;

pub use error::{Error, Result};
pub use nendb_api::{
    DEFAULT_EMBEDDING_DIM, Direction, EDGE_PROPS_LEN, EdgeHandle, EdgeInfo, EdgeLabel,
    GraphRead, NODE_PROPS_LEN, NodeHandle, NodeId, NodeKind, PropValue,
};
pub use nendb_query as query;
pub use nendb_query::{ResultSet, Value};
pub use nendb_storage::config::DbConfig;
pub use nendb_storage::stats::DbStats;
pub use nendb_storage::txn::{IsolationLevel, Transaction};
pub use nendb_storage::{
    engine, manifest, pool, snapshot, stats, sync, txn, wal,
};

/// The main database handle.
///
/// Wraps the storage engine with the query engine and an in-memory
/// registry mapping symbolic label names to the numeric kind/label tags
/// the pools store. Numeric labels in queries (`(n:7)`, `[:5]`) resolve
/// directly; symbolic names must be registered first.
#[derive(Debug)]
pub struct Database {
    engine: GraphDb,
    kinds: RwLock<HashMap<String, NodeKind>>,
    edge_labels: RwLock<HashMap<String, EdgeLabel>>,
}

impl Database {
    /// Initializes a fresh database in `config.data_dir`.
    pub fn init(config: DbConfig) -> Result<Self> {
        Ok(Self::wrap(GraphDb::init_inplace(config)?))
    }

    /// Opens an existing database, replaying snapshot and WAL.
    pub fn open(config: DbConfig) -> Result<Self> {
        Ok(Self::wrap(GraphDb::open_inplace(config)?))
    }

    /// Opens a database for reading only; mutations and snapshots are
    /// refused with `ReadOnly`.
    pub fn open_read_only(config: DbConfig) -> Result<Self> {
        Ok(Self::wrap(GraphDb::open_read_only(config)?))
    }

    fn wrap(engine: GraphDb) -> Self {
        Self {
            engine,
            kinds: RwLock::new(HashMap::new()),
            edge_labels: RwLock::new(HashMap::new()),
        }
    }

    /// Maps a node label name to a kind tag for use in queries.
    pub fn register_kind(&self, name: impl Into<String>, kind: NodeKind) {
        self.kinds.write().insert(name.into(), kind);
    }

    /// Maps a relationship type name to an edge label tag.
    pub fn register_edge_label(&self, name: impl Into<String>, label: EdgeLabel) {
        self.edge_labels.write().insert(name.into(), label);
    }

    /// Parses and runs a query, returning its rows (empty for queries
    /// without RETURN).
    pub fn execute(&self, input: &str) -> Result<ResultSet> {
        let ast = nendb_query::parse(input)?;
        let mut session = Session { db: self };
        nendb_query::execute(&ast, &mut session).map_err(Error::from)
    }

    // -- direct storage access --------------------------------------------

    pub fn insert_node(&self, record: NodeRecord) -> Result<NodeHandle> {
        self.engine.insert_node(record).map_err(Error::from)
    }

    pub fn lookup_node(&self, id: NodeId) -> Option<NodeView> {
        self.engine.lookup_node(id)
    }

    pub fn delete_node(&self, id: NodeId) -> Result<()> {
        self.engine.delete_node(id, false).map(|_| ()).map_err(Error::from)
    }

    /// Deletes a node together with all incident edges; returns how many
    /// edges were removed.
    pub fn detach_delete_node(&self, id: NodeId) -> Result<usize> {
        self.engine.delete_node(id, true).map_err(Error::from)
    }

    pub fn insert_edge(&self, record: EdgeRecord) -> Result<EdgeHandle> {
        self.engine.insert_edge(record).map_err(Error::from)
    }

    pub fn lookup_edge_by_slot(&self, slot: u32) -> Option<EdgeView> {
        self.engine.lookup_edge_by_slot(slot)
    }

    pub fn delete_edge(&self, handle: EdgeHandle) -> Result<()> {
        self.engine.delete_edge(handle).map_err(Error::from)
    }

    pub fn neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        label: Option<EdgeLabel>,
    ) -> Vec<EdgeInfo> {
        self.engine.neighbors(id, direction, label)
    }

    /// Reads one key out of a node's props blob.
    pub fn node_prop(&self, id: NodeId, key: &str) -> Option<PropValue> {
        let view = self.engine.lookup_node(id)?;
        property::get(&view.props, key)
    }

    /// Sets one key in a node's props blob (WAL-logged as a full blob
    /// rewrite).
    pub fn set_node_prop(&self, id: NodeId, key: &str, value: PropValue) -> Result<()> {
        let view = self
            .engine
            .lookup_node(id)
            .ok_or(nendb_storage::Error::NotFound(id))?;
        let props = property::set::<NODE_PROPS_LEN>(&view.props, key, value)?;
        self.engine.set_node_props(id, props).map_err(Error::from)
    }

    pub fn upsert_embedding(&self, node_id: NodeId, vector: &[f32]) -> Result<()> {
        self.engine
            .upsert_embedding(node_id, vector)
            .map_err(Error::from)
    }

    pub fn get_embedding(&self, node_id: NodeId) -> Option<Vec<f32>> {
        self.engine.get_embedding(node_id)
    }

    // -- durability & lifecycle -------------------------------------------

    /// Lock-free stats snapshot: per-pool usage, WAL counters, WAL health.
    pub fn get_stats(&self) -> DbStats {
        self.engine.get_stats()
    }

    /// Flushes the WAL's user-space buffer to the OS.
    pub fn flush(&self) -> Result<()> {
        self.engine.flush().map_err(Error::from)
    }

    /// Flushes and fsyncs the WAL. Mutations acknowledged before `sync`
    /// returns are durable across a crash.
    pub fn sync(&self) -> Result<()> {
        self.engine.sync().map_err(Error::from)
    }

    /// Writes a point-in-time snapshot of the pools to `path`.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.engine.snapshot(path).map_err(Error::from)
    }

    /// Loads a snapshot into this (empty) database and checkpoints so the
    /// restored state is durable.
    pub fn restore_from_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.engine.restore_from_snapshot(path).map_err(Error::from)
    }

    /// Drops all pool contents; intended as the precursor to a restore.
    pub fn clear(&self) -> Result<()> {
        self.engine.clear().map_err(Error::from)
    }

    /// Forces a cadence checkpoint (snapshot + WAL rotation + manifest).
    pub fn checkpoint(&self) -> Result<()> {
        self.engine.checkpoint_now().map_err(Error::from)
    }

    /// Starts a transaction object tracking read/write sets. Isolation
    /// enforcement beyond read-committed is reserved for future versions.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Transaction {
        self.engine.begin_transaction(isolation)
    }
}

/// Bridges one query execution onto the engine.
struct Session<'a> {
    db: &'a Database,
}

impl GraphRead for Session<'_> {
    fn nodes(&self) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(self.db.engine.node_ids().into_iter())
    }

    fn contains_node(&self, id: NodeId) -> bool {
        self.db.engine.contains_node(id)
    }

    fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        self.db.engine.lookup_node(id).map(|view| view.kind)
    }

    fn node_prop(&self, id: NodeId, key: &str) -> Option<PropValue> {
        self.db.node_prop(id, key)
    }

    fn node_props(&self, id: NodeId) -> Option<Vec<(String, PropValue)>> {
        let view = self.db.engine.lookup_node(id)?;
        property::decode_bag(&view.props).ok()
    }

    fn neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        label: Option<EdgeLabel>,
    ) -> Box<dyn Iterator<Item = EdgeInfo> + '_> {
        Box::new(self.db.engine.neighbors(id, direction, label).into_iter())
    }

    fn edge_info(&self, handle: EdgeHandle) -> Option<EdgeInfo> {
        self.db.engine.lookup_edge(handle).map(|view| EdgeInfo {
            handle: view.handle,
            from: view.from,
            to: view.to,
            label: view.label,
        })
    }

    fn edge_prop(&self, handle: EdgeHandle, key: &str) -> Option<PropValue> {
        let view = self.db.engine.lookup_edge(handle)?;
        property::get(&view.props, key)
    }

    fn resolve_kind(&self, name: &str) -> Option<NodeKind> {
        self.db.kinds.read().get(name).copied()
    }

    fn resolve_edge_label(&self, name: &str) -> Option<EdgeLabel> {
        self.db.edge_labels.read().get(name).copied()
    }
}

fn storage_err(e: nendb_storage::Error) -> nendb_query::Error {
    nendb_query::Error::Storage(e.to_string())
}

impl GraphWrite for Session<'_> {
    fn create_node(
        &mut self,
        id: Option<NodeId>,
        kind: NodeKind,
        props: Vec<(String, PropValue)>,
    ) -> nendb_query::Result<NodeId> {
        let id = id.unwrap_or_else(|| self.db.engine.generate_node_id());
        let blob = property::encode_bag::<NODE_PROPS_LEN>(&props).map_err(storage_err)?;
        self.db
            .engine
            .insert_node(NodeRecord {
                id,
                kind,
                props: blob,
            })
            .map_err(storage_err)?;
        Ok(id)
    }

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
        props: Vec<(String, PropValue)>,
    ) -> nendb_query::Result<EdgeHandle> {
        let blob = property::encode_bag::<EDGE_PROPS_LEN>(&props).map_err(storage_err)?;
        self.db
            .engine
            .insert_edge(EdgeRecord {
                from,
                to,
                label,
                props: blob,
            })
            .map_err(storage_err)
    }

    fn set_node_prop(
        &mut self,
        id: NodeId,
        key: &str,
        value: PropValue,
    ) -> nendb_query::Result<()> {
        self.db.set_node_prop(id, key, value).map_err(|e| match e {
            Error::Storage(e) => storage_err(e),
            Error::Query(e) => e,
        })
    }

    fn remove_node_prop(&mut self, id: NodeId, key: &str) -> nendb_query::Result<()> {
        let Some(view) = self.db.engine.lookup_node(id) else {
            return Err(storage_err(nendb_storage::Error::NotFound(id)));
        };
        let props =
            property::remove::<NODE_PROPS_LEN>(&view.props, key).map_err(storage_err)?;
        self.db.engine.set_node_props(id, props).map_err(storage_err)
    }

    fn delete_node(&mut self, id: NodeId, detach: bool) -> nendb_query::Result<usize> {
        self.db.engine.delete_node(id, detach).map_err(storage_err)
    }

    fn delete_edge(&mut self, handle: EdgeHandle) -> nendb_query::Result<bool> {
        match self.db.engine.delete_edge(handle) {
            Ok(()) => Ok(true),
            Err(nendb_storage::Error::StaleHandle { .. }) => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }
}
