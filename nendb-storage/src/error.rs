use nendb_api::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pool exhausted: {0}")]
    PoolExhausted(&'static str),

    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),

    #[error("node id {0} not found")]
    NotFound(NodeId),

    #[error("edge endpoint {0} does not resolve to a live node")]
    DanglingEndpoint(NodeId),

    #[error("node id {0} still has incident edges")]
    HasIncidentEdges(NodeId),

    #[error("stale handle: slot {slot} generation mismatch")]
    StaleHandle { slot: u32 },

    #[error("wal corrupt: {0}")]
    WalCorrupt(&'static str),

    #[error("unknown wal op code {0}")]
    UnknownOp(u8),

    #[error("wal unhealthy after earlier io failure")]
    WalUnhealthy,

    #[error("snapshot corrupt: {0}")]
    SnapshotCorrupt(&'static str),

    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(&'static str),

    #[error("database is read-only")]
    ReadOnly,

    #[error("restore target is not empty")]
    NotEmpty,

    #[error("props blob too large for fixed slot")]
    PropsTooLarge,

    #[error("props blob corrupt: {0}")]
    PropsCorrupt(&'static str),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("lock id {0} already held")]
    AlreadyLocked(u32),

    #[error("lock table full")]
    LockTableFull,

    #[error("invalid transaction state transition: {0}")]
    TxnState(&'static str),
}
