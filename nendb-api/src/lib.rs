use serde::{Deserialize, Serialize};

/// User-supplied opaque node identifier, unique across live nodes.
pub type NodeId = u64;
/// Index of a slot inside a fixed-capacity pool.
pub type SlotIndex = u32;
/// Reuse counter for a pool slot.
pub type Generation = u32;
/// Domain tag attached to a node.
pub type NodeKind = u8;
/// Domain tag attached to an edge.
pub type EdgeLabel = u16;

/// Inline property blob size for nodes.
pub const NODE_PROPS_LEN: usize = 128;
/// Inline property blob size for edges.
pub const EDGE_PROPS_LEN: usize = 64;
/// Embedding dimension used when the configuration does not override it.
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// Sentinel slot index marking the end of an intrusive adjacency list.
pub const NIL_SLOT: SlotIndex = SlotIndex::MAX;

/// Stable reference to a live node slot. The generation detects slot reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    pub slot: SlotIndex,
    pub generation: Generation,
}

/// Stable reference to a live edge slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeHandle {
    pub slot: SlotIndex,
    pub generation: Generation,
}

/// Traversal direction for adjacency iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A decoded property value stored inside a node or edge props blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Resolved view of one edge, as yielded by adjacency traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeInfo {
    pub handle: EdgeHandle,
    pub from: NodeId,
    pub to: NodeId,
    pub label: EdgeLabel,
}

/// Read access to a graph, as consumed by the query engine.
///
/// Implementations resolve nodes by their external id and expose adjacency
/// filtered by direction and optional edge label. Iteration order is
/// deterministic but unspecified; callers must not rely on it.
pub trait GraphRead {
    fn nodes(&self) -> Box<dyn Iterator<Item = NodeId> + '_>;

    fn contains_node(&self, id: NodeId) -> bool;

    fn node_kind(&self, id: NodeId) -> Option<NodeKind>;

    fn node_prop(&self, id: NodeId, key: &str) -> Option<PropValue>;

    fn node_props(&self, id: NodeId) -> Option<Vec<(String, PropValue)>>;

    fn neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        label: Option<EdgeLabel>,
    ) -> Box<dyn Iterator<Item = EdgeInfo> + '_>;

    fn edge_info(&self, handle: EdgeHandle) -> Option<EdgeInfo>;

    fn edge_prop(&self, handle: EdgeHandle, key: &str) -> Option<PropValue>;

    /// Resolves a node label name to its kind tag. Numeric names are handled
    /// by the caller; this covers registered symbolic names only.
    fn resolve_kind(&self, name: &str) -> Option<NodeKind>;

    /// Resolves an edge label name to its numeric tag.
    fn resolve_edge_label(&self, name: &str) -> Option<EdgeLabel>;
}
