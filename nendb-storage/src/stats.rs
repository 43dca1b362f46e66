//! Pool and WAL counters, published as one `Copy` record so readers can
//! take them through the seqlock without blocking writers. Serializable so
//! surrounding layers can export them as-is.

use crate::pool::PoolUsage;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub nodes: PoolUsage,
    pub edges: PoolUsage,
    pub embeddings: PoolUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalCounters {
    pub entries_written: u64,
    pub bytes_written: u64,
    pub truncations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalHealth {
    pub healthy: bool,
    pub io_error_count: u32,
}

impl Default for WalHealth {
    fn default() -> Self {
        Self {
            healthy: true,
            io_error_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub memory: MemoryStats,
    pub wal: WalCounters,
    pub wal_health: WalHealth,
}
