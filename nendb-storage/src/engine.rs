//! The storage engine: pools + WAL + snapshots behind one lock discipline.
//!
//! Every mutation takes the write lock, validates against the pools, appends
//! to the WAL, and only then mutates pool state; a WAL append failure aborts
//! the mutation and marks the log unhealthy until reopen. Reads take the
//! read lock; stats are published through a seqlock and never block.

use crate::config::DbConfig;
use crate::manifest::Manifest;
use crate::pool::{EdgeRecord, EdgeView, NodeRecord, NodeView, Pools};
use crate::stats::{DbStats, MemoryStats, WalCounters, WalHealth};
use crate::sync::{AtomicIdGenerator, RwLock, SeqLock};
use crate::txn::{IsolationLevel, Transaction};
use crate::wal::{self, Wal, WalEntry, WAL_HEADER_LEN};
use crate::{snapshot, Error, Result};
use nendb_api::{Direction, EdgeHandle, EdgeInfo, EdgeLabel, NodeHandle, NodeId, SlotIndex};
use std::path::{Path, PathBuf};

pub const WAL_FILE: &str = "nendb.wal";
pub const SNAPSHOT_PREFIX: &str = "nendb.snap";
pub const MANIFEST_FILE: &str = "nendb.manifest";

#[derive(Debug)]
struct Inner {
    pools: Pools,
    wal: Option<Wal>,
    wal_counters: WalCounters,
    wal_health: WalHealth,
    snapshot_seq: u64,
    ops_since_snapshot: u64,
}

/// The single entry point over pools, id index, WAL, and snapshot policy.
#[derive(Debug)]
pub struct GraphDb {
    dir: PathBuf,
    config: DbConfig,
    read_only: bool,
    inner: RwLock<Inner>,
    stats: SeqLock<DbStats>,
    node_id_gen: AtomicIdGenerator,
    txn_id_gen: AtomicIdGenerator,
}

impl GraphDb {
    /// Initializes a fresh database in `config.data_dir`, truncating any
    /// existing WAL and removing any manifest.
    pub fn init_inplace(config: DbConfig) -> Result<Self> {
        if config.read_only {
            return Err(Error::ReadOnly);
        }
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join(WAL_FILE);
        let manifest_path = config.data_dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            std::fs::remove_file(&manifest_path)?;
        }
        let wal = Wal::create(&wal_path, config.wal_buffer_size, config.embedding_dim)?;
        let pools = Pools::new(
            config.node_capacity,
            config.edge_capacity,
            config.embedding_capacity,
            config.embedding_dim,
        );
        Ok(Self::assemble(config, pools, Some(wal), WalCounters::default(), 0))
    }

    /// Opens an existing database, loading the manifest's snapshot (if any)
    /// and replaying the WAL tail on top.
    pub fn open_inplace(config: DbConfig) -> Result<Self> {
        if config.read_only {
            return Err(Error::ReadOnly);
        }
        std::fs::create_dir_all(&config.data_dir)?;
        let (pools, recovered, snapshot_seq) = Self::load_state(&config, true)?;
        let wal_path = config.data_dir.join(WAL_FILE);
        let wal = Wal::open_for_append(
            &wal_path,
            config.wal_buffer_size,
            config.embedding_dim,
            recovered,
        )?;
        let counters = WalCounters {
            entries_written: recovered.entries,
            bytes_written: recovered.bytes,
            truncations: recovered.truncations,
        };
        Ok(Self::assemble(config, pools, Some(wal), counters, snapshot_seq))
    }

    /// Opens a database for reading only: no WAL appends, no snapshots.
    /// A torn WAL tail is skipped without modifying the file.
    pub fn open_read_only(mut config: DbConfig) -> Result<Self> {
        config.read_only = true;
        let (pools, recovered, snapshot_seq) = Self::load_state(&config, false)?;
        let counters = WalCounters {
            entries_written: recovered.entries,
            bytes_written: recovered.bytes,
            truncations: recovered.truncations,
        };
        Ok(Self::assemble(config, pools, None, counters, snapshot_seq))
    }

    fn load_state(
        config: &DbConfig,
        fix_tail: bool,
    ) -> Result<(Pools, wal::RecoveryStats, u64)> {
        let mut pools = Pools::new(
            config.node_capacity,
            config.edge_capacity,
            config.embedding_capacity,
            config.embedding_dim,
        );
        let manifest = Manifest::load(config.data_dir.join(MANIFEST_FILE))?;
        let mut snapshot_seq = 0;
        let mut replay_from = WAL_HEADER_LEN;
        if let Some(m) = manifest {
            let snap_path = snapshot_file(&config.data_dir, m.snapshot_seq);
            snapshot::load_snapshot(&mut pools, &snap_path)?;
            snapshot_seq = m.snapshot_seq;
            replay_from = m.wal_offset;
        }

        let wal_path = config.data_dir.join(WAL_FILE);
        let recovered = if fix_tail || wal_path.exists() {
            wal::recover(&wal_path, replay_from, config.embedding_dim, fix_tail, |entry| {
                apply_entry(&mut pools, entry)
            })?
        } else {
            wal::RecoveryStats::default()
        };

        Ok((pools, recovered, snapshot_seq))
    }

    fn assemble(
        config: DbConfig,
        pools: Pools,
        wal: Option<Wal>,
        counters: WalCounters,
        snapshot_seq: u64,
    ) -> Self {
        let max_id = pools.node_ids().max().unwrap_or(0);
        let read_only = config.read_only;
        let dir = config.data_dir.clone();
        let inner = Inner {
            pools,
            wal,
            wal_counters: counters,
            wal_health: WalHealth::default(),
            snapshot_seq,
            ops_since_snapshot: 0,
        };
        let stats = SeqLock::new(compute_stats(&inner));
        Self {
            dir,
            config,
            read_only,
            inner: RwLock::new(inner),
            stats,
            node_id_gen: AtomicIdGenerator::new(max_id + 1),
            txn_id_gen: AtomicIdGenerator::new(1),
        }
    }

    #[inline]
    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Hands out a fresh node id above everything seen so far. Used by
    /// callers creating nodes without an explicit id.
    pub fn generate_node_id(&self) -> NodeId {
        self.node_id_gen.generate()
    }

    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Transaction {
        Transaction::new(self.txn_id_gen.generate(), isolation)
    }

    /// Lock-free stats snapshot.
    pub fn get_stats(&self) -> DbStats {
        self.stats.read()
    }

    pub fn insert_node(&self, record: NodeRecord) -> Result<NodeHandle> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.ensure_healthy(&inner)?;
        if inner.pools.contains_node(record.id) {
            return Err(Error::DuplicateId(record.id));
        }
        if inner.pools.node_usage().free == 0 {
            return Err(Error::PoolExhausted("nodes"));
        }
        self.wal_append(
            &mut inner,
            &WalEntry::InsertNode {
                id: record.id,
                kind: record.kind,
                props: record.props,
            },
        )?;
        let handle = inner.pools.insert_node(record)?;
        self.finish_mutation(&mut inner)?;
        Ok(handle)
    }

    pub fn lookup_node(&self, id: NodeId) -> Option<NodeView> {
        self.inner.read().pools.lookup_node(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.inner.read().pools.contains_node(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.read().pools.node_ids().collect()
    }

    pub fn set_node_props(&self, id: NodeId, props: [u8; nendb_api::NODE_PROPS_LEN]) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.ensure_healthy(&inner)?;
        if !inner.pools.contains_node(id) {
            return Err(Error::NotFound(id));
        }
        self.wal_append(&mut inner, &WalEntry::SetNodeProps { id, props })?;
        inner.pools.set_node_props(id, props)?;
        self.finish_mutation(&mut inner)?;
        Ok(())
    }

    /// Deletes a node. Without `detach` the node must have no incident
    /// edges; with it, incident edges are removed as part of the same
    /// operation. Returns how many edges were removed.
    pub fn delete_node(&self, id: NodeId, detach: bool) -> Result<usize> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.ensure_healthy(&inner)?;
        if !inner.pools.contains_node(id) {
            return Err(Error::NotFound(id));
        }
        let incident = inner.pools.incident_edges(id);
        if !detach && !incident.is_empty() {
            return Err(Error::HasIncidentEdges(id));
        }
        for edge in &incident {
            self.wal_append(
                &mut inner,
                &WalEntry::DeleteEdge {
                    from: edge.from,
                    to: edge.to,
                    label: edge.label,
                },
            )?;
        }
        self.wal_append(&mut inner, &WalEntry::DeleteNode { id })?;
        let removed = if detach {
            inner.pools.detach_delete_node(id)?
        } else {
            inner.pools.delete_node(id)?;
            0
        };
        self.finish_mutation(&mut inner)?;
        Ok(removed)
    }

    pub fn insert_edge(&self, record: EdgeRecord) -> Result<EdgeHandle> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.ensure_healthy(&inner)?;
        if !inner.pools.contains_node(record.from) {
            return Err(Error::DanglingEndpoint(record.from));
        }
        if !inner.pools.contains_node(record.to) {
            return Err(Error::DanglingEndpoint(record.to));
        }
        if inner.pools.edge_usage().free == 0 {
            return Err(Error::PoolExhausted("edges"));
        }
        self.wal_append(
            &mut inner,
            &WalEntry::InsertEdge {
                from: record.from,
                to: record.to,
                label: record.label,
                props: record.props,
            },
        )?;
        let handle = inner.pools.insert_edge(record)?;
        self.finish_mutation(&mut inner)?;
        Ok(handle)
    }

    pub fn lookup_edge_by_slot(&self, slot: SlotIndex) -> Option<EdgeView> {
        self.inner.read().pools.lookup_edge_by_slot(slot)
    }

    pub fn lookup_edge(&self, handle: EdgeHandle) -> Option<EdgeView> {
        self.inner.read().pools.lookup_edge(handle)
    }

    pub fn delete_edge(&self, handle: EdgeHandle) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.ensure_healthy(&inner)?;
        let view = inner
            .pools
            .lookup_edge(handle)
            .ok_or(Error::StaleHandle { slot: handle.slot })?;
        self.wal_append(
            &mut inner,
            &WalEntry::DeleteEdge {
                from: view.from,
                to: view.to,
                label: view.label,
            },
        )?;
        inner.pools.delete_edge(handle)?;
        self.finish_mutation(&mut inner)?;
        Ok(())
    }

    /// Materialized adjacency for `id`; the pool-level iterator stays lazy,
    /// this copies it out from under the read lock.
    pub fn neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        label: Option<EdgeLabel>,
    ) -> Vec<EdgeInfo> {
        self.inner
            .read()
            .pools
            .neighbors(id, direction, label)
            .collect()
    }

    pub fn upsert_embedding(&self, node_id: NodeId, vector: &[f32]) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.ensure_healthy(&inner)?;
        if vector.len() != inner.pools.embedding_dim() {
            return Err(Error::DimMismatch {
                expected: inner.pools.embedding_dim(),
                got: vector.len(),
            });
        }
        if !inner.pools.contains_node(node_id) {
            return Err(Error::DanglingEndpoint(node_id));
        }
        if inner.pools.get_embedding(node_id).is_none()
            && inner.pools.embedding_usage().free == 0
        {
            return Err(Error::PoolExhausted("embeddings"));
        }
        self.wal_append(
            &mut inner,
            &WalEntry::EmbeddingUpsert {
                id: node_id,
                vector: vector.to_vec(),
            },
        )?;
        inner.pools.upsert_embedding(node_id, vector)?;
        self.finish_mutation(&mut inner)?;
        Ok(())
    }

    pub fn get_embedding(&self, node_id: NodeId) -> Option<Vec<f32>> {
        self.inner
            .read()
            .pools
            .get_embedding(node_id)
            .map(|v| v.to_vec())
    }

    pub fn flush(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.with_wal_io(&mut inner, |wal| wal.flush())
    }

    /// Flushes and fsyncs the WAL. Mutations acknowledged before this call
    /// are durable across a crash once it returns.
    pub fn sync(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.with_wal_io(&mut inner, |wal| wal.sync())
    }

    /// Writes a point-in-time snapshot of the pools to `path`.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_writable()?;
        let inner = self.inner.write();
        snapshot::write_snapshot(&inner.pools, path)
    }

    /// Loads a snapshot into this database. The pools must be empty (fresh
    /// init or an explicit [`GraphDb::clear`]). On success a checkpoint is
    /// taken immediately so the restored state survives a crash.
    pub fn restore_from_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        snapshot::load_snapshot(&mut inner.pools, path)?;
        let max_id = inner.pools.node_ids().max().unwrap_or(0);
        self.node_id_gen.bump_to(max_id + 1);
        self.checkpoint(&mut inner)?;
        self.publish_stats(&inner);
        Ok(())
    }

    /// Drops all pool contents. Durability of the cleared state follows
    /// from the next checkpoint (a restore performs one immediately).
    pub fn clear(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        inner.pools = Pools::new(
            self.config.node_capacity,
            self.config.edge_capacity,
            self.config.embedding_capacity,
            self.config.embedding_dim,
        );
        self.publish_stats(&inner);
        Ok(())
    }

    /// Forces a cadence checkpoint: snapshot, WAL rotation, manifest
    /// switch, segment pruning.
    pub fn checkpoint_now(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.write();
        self.checkpoint(&mut inner)?;
        self.publish_stats(&inner);
        Ok(())
    }

    fn checkpoint(&self, inner: &mut Inner) -> Result<()> {
        let seq = inner.snapshot_seq + 1;
        snapshot::write_snapshot(&inner.pools, snapshot_file(&self.dir, seq))?;
        let wal = inner.wal.as_mut().ok_or(Error::ReadOnly)?;
        wal.rotate(seq)?;
        Manifest {
            snapshot_seq: seq,
            wal_offset: WAL_HEADER_LEN,
        }
        .store(self.dir.join(MANIFEST_FILE))?;
        wal::delete_segments_keep_last(&self.dir.join(WAL_FILE), self.config.max_wal_segments)?;
        inner.snapshot_seq = seq;
        inner.ops_since_snapshot = 0;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn ensure_healthy(&self, inner: &Inner) -> Result<()> {
        if !inner.wal_health.healthy {
            return Err(Error::WalUnhealthy);
        }
        Ok(())
    }

    fn wal_append(&self, inner: &mut Inner, entry: &WalEntry) -> Result<()> {
        let result = inner
            .wal
            .as_mut()
            .ok_or(Error::ReadOnly)
            .and_then(|wal| wal.append(entry));
        if let Err(e) = result {
            inner.wal_health.healthy = false;
            inner.wal_health.io_error_count += 1;
            self.publish_stats(inner);
            return Err(e);
        }
        Ok(())
    }

    fn with_wal_io(
        &self,
        inner: &mut Inner,
        f: impl FnOnce(&mut Wal) -> Result<()>,
    ) -> Result<()> {
        self.ensure_healthy(inner)?;
        let result = inner.wal.as_mut().ok_or(Error::ReadOnly).and_then(f);
        if let Err(e) = result {
            inner.wal_health.healthy = false;
            inner.wal_health.io_error_count += 1;
            self.publish_stats(inner);
            return Err(e);
        }
        Ok(())
    }

    fn finish_mutation(&self, inner: &mut Inner) -> Result<()> {
        if let Some(wal) = inner.wal.as_ref() {
            inner.wal_counters.entries_written = wal.entries_written();
            inner.wal_counters.bytes_written = wal.bytes_written();
        }
        inner.ops_since_snapshot += 1;
        let due = inner.ops_since_snapshot >= self.config.snapshot_every_ops;
        if due {
            self.checkpoint(inner)?;
        }
        self.publish_stats(inner);
        Ok(())
    }

    fn publish_stats(&self, inner: &Inner) {
        self.stats.write(compute_stats(inner));
    }
}

fn compute_stats(inner: &Inner) -> DbStats {
    DbStats {
        memory: MemoryStats {
            nodes: inner.pools.node_usage(),
            edges: inner.pools.edge_usage(),
            embeddings: inner.pools.embedding_usage(),
        },
        wal: inner.wal_counters,
        wal_health: inner.wal_health,
    }
}

fn snapshot_file(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("{SNAPSHOT_PREFIX}.{seq}"))
}

fn apply_entry(pools: &mut Pools, entry: WalEntry) -> Result<()> {
    match entry {
        WalEntry::InsertNode { id, kind, props } => {
            pools.insert_node(NodeRecord { id, kind, props })?;
        }
        WalEntry::DeleteNode { id } => {
            pools.delete_node(id)?;
        }
        WalEntry::InsertEdge {
            from,
            to,
            label,
            props,
        } => {
            pools.insert_edge(EdgeRecord {
                from,
                to,
                label,
                props,
            })?;
        }
        WalEntry::DeleteEdge { from, to, label } => {
            pools.delete_edge_by_key(from, to, label)?;
        }
        WalEntry::SetNodeProps { id, props } => {
            pools.set_node_props(id, props)?;
        }
        WalEntry::EmbeddingUpsert { id, vector } => {
            pools.upsert_embedding(id, &vector)?;
        }
    }
    Ok(())
}
