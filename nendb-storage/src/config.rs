use nendb_api::DEFAULT_EMBEDDING_DIM;
use std::path::PathBuf;

pub const DEFAULT_NODE_CAPACITY: u32 = 4096;
pub const DEFAULT_EDGE_CAPACITY: u32 = 16384;
pub const DEFAULT_EMBEDDING_CAPACITY: u32 = 1024;
pub const DEFAULT_WAL_BUFFER_SIZE: usize = 64 * 1024;
pub const DEFAULT_SNAPSHOT_EVERY_OPS: u64 = 10_000;
pub const DEFAULT_WAL_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_MAX_WAL_SEGMENTS: usize = 4;

/// Open-time configuration. All pool capacities are fixed for the lifetime
/// of the database instance; exceeding any of them yields `PoolExhausted`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub data_dir: PathBuf,
    pub node_capacity: u32,
    pub edge_capacity: u32,
    pub embedding_capacity: u32,
    pub embedding_dim: usize,
    pub wal_buffer_size: usize,
    pub snapshot_every_ops: u64,
    pub wal_segment_size: u64,
    pub max_wal_segments: usize,
    pub read_only: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            node_capacity: DEFAULT_NODE_CAPACITY,
            edge_capacity: DEFAULT_EDGE_CAPACITY,
            embedding_capacity: DEFAULT_EMBEDDING_CAPACITY,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            wal_buffer_size: DEFAULT_WAL_BUFFER_SIZE,
            snapshot_every_ops: DEFAULT_SNAPSHOT_EVERY_OPS,
            wal_segment_size: DEFAULT_WAL_SEGMENT_SIZE,
            max_wal_segments: DEFAULT_MAX_WAL_SEGMENTS,
            read_only: false,
        }
    }
}

impl DbConfig {
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }
}
