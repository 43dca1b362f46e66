//! Fixed-capacity, struct-of-arrays entity pools.
//!
//! Each pool keeps one parallel array per record field plus `active` and
//! `generation` arrays. All arrays are allocated to full capacity at
//! construction and never resized; slot indices are stable for the lifetime
//! of a slot. Freed slots go onto a LIFO free list and bump their generation
//! so `(slot, generation)` handles detect reuse.
//!
//! Adjacency is intrusive: node slots hold the heads of their outgoing and
//! incoming edge lists, edge slots hold `next_out` / `next_in` links. Edge
//! insertion is O(1); deletion unlinks in O(degree).

use crate::{Error, Result};
use nendb_api::{
    Direction, EDGE_PROPS_LEN, EdgeHandle, EdgeInfo, EdgeLabel, Generation, NIL_SLOT,
    NODE_PROPS_LEN, NodeHandle, NodeId, NodeKind, SlotIndex,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub props: [u8; NODE_PROPS_LEN],
}

impl NodeRecord {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            props: [0u8; NODE_PROPS_LEN],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub label: EdgeLabel,
    pub props: [u8; EDGE_PROPS_LEN],
}

impl EdgeRecord {
    pub fn new(from: NodeId, to: NodeId, label: EdgeLabel) -> Self {
        Self {
            from,
            to,
            label,
            props: [0u8; EDGE_PROPS_LEN],
        }
    }
}

/// Read-only copy of a live node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView {
    pub handle: NodeHandle,
    pub id: NodeId,
    pub kind: NodeKind,
    pub props: [u8; NODE_PROPS_LEN],
}

/// Read-only copy of a live edge slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeView {
    pub handle: EdgeHandle,
    pub from: NodeId,
    pub to: NodeId,
    pub label: EdgeLabel,
    pub props: [u8; EDGE_PROPS_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct PoolUsage {
    pub used: u64,
    pub free: u64,
    pub capacity: u64,
}

#[derive(Debug)]
struct NodePool {
    ids: Vec<NodeId>,
    kinds: Vec<NodeKind>,
    props: Vec<[u8; NODE_PROPS_LEN]>,
    active: Vec<bool>,
    generation: Vec<Generation>,
    first_out: Vec<SlotIndex>,
    first_in: Vec<SlotIndex>,
    free: Vec<SlotIndex>,
    high_water: SlotIndex,
    capacity: SlotIndex,
    index: HashMap<NodeId, SlotIndex>,
}

impl NodePool {
    fn new(capacity: u32) -> Self {
        let cap = capacity as usize;
        Self {
            ids: vec![0; cap],
            kinds: vec![0; cap],
            props: vec![[0u8; NODE_PROPS_LEN]; cap],
            active: vec![false; cap],
            generation: vec![0; cap],
            first_out: vec![NIL_SLOT; cap],
            first_in: vec![NIL_SLOT; cap],
            free: Vec::with_capacity(cap),
            high_water: 0,
            capacity,
            index: HashMap::with_capacity(cap),
        }
    }

    fn alloc(&mut self) -> Option<SlotIndex> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        if self.high_water < self.capacity {
            let slot = self.high_water;
            self.high_water += 1;
            return Some(slot);
        }
        None
    }

    fn release(&mut self, slot: SlotIndex) {
        self.active[slot as usize] = false;
        self.generation[slot as usize] = self.generation[slot as usize].wrapping_add(1);
        self.free.push(slot);
    }

    fn usage(&self) -> PoolUsage {
        let used = self.high_water as u64 - self.free.len() as u64;
        PoolUsage {
            used,
            free: self.capacity as u64 - used,
            capacity: self.capacity as u64,
        }
    }
}

#[derive(Debug)]
struct EdgePool {
    from: Vec<NodeId>,
    to: Vec<NodeId>,
    labels: Vec<EdgeLabel>,
    props: Vec<[u8; EDGE_PROPS_LEN]>,
    active: Vec<bool>,
    generation: Vec<Generation>,
    next_out: Vec<SlotIndex>,
    next_in: Vec<SlotIndex>,
    free: Vec<SlotIndex>,
    high_water: SlotIndex,
    capacity: SlotIndex,
}

impl EdgePool {
    fn new(capacity: u32) -> Self {
        let cap = capacity as usize;
        Self {
            from: vec![0; cap],
            to: vec![0; cap],
            labels: vec![0; cap],
            props: vec![[0u8; EDGE_PROPS_LEN]; cap],
            active: vec![false; cap],
            generation: vec![0; cap],
            next_out: vec![NIL_SLOT; cap],
            next_in: vec![NIL_SLOT; cap],
            free: Vec::with_capacity(cap),
            high_water: 0,
            capacity,
        }
    }

    fn alloc(&mut self) -> Option<SlotIndex> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        if self.high_water < self.capacity {
            let slot = self.high_water;
            self.high_water += 1;
            return Some(slot);
        }
        None
    }

    fn release(&mut self, slot: SlotIndex) {
        self.active[slot as usize] = false;
        self.generation[slot as usize] = self.generation[slot as usize].wrapping_add(1);
        self.next_out[slot as usize] = NIL_SLOT;
        self.next_in[slot as usize] = NIL_SLOT;
        self.free.push(slot);
    }

    fn usage(&self) -> PoolUsage {
        let used = self.high_water as u64 - self.free.len() as u64;
        PoolUsage {
            used,
            free: self.capacity as u64 - used,
            capacity: self.capacity as u64,
        }
    }
}

#[derive(Debug)]
struct EmbeddingPool {
    node_ids: Vec<NodeId>,
    vectors: Vec<f32>,
    active: Vec<bool>,
    generation: Vec<Generation>,
    free: Vec<SlotIndex>,
    high_water: SlotIndex,
    capacity: SlotIndex,
    dim: usize,
    index: HashMap<NodeId, SlotIndex>,
}

impl EmbeddingPool {
    fn new(capacity: u32, dim: usize) -> Self {
        let cap = capacity as usize;
        Self {
            node_ids: vec![0; cap],
            vectors: vec![0.0; cap * dim],
            active: vec![false; cap],
            generation: vec![0; cap],
            free: Vec::with_capacity(cap),
            high_water: 0,
            capacity,
            dim,
            index: HashMap::with_capacity(cap),
        }
    }

    fn alloc(&mut self) -> Option<SlotIndex> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        if self.high_water < self.capacity {
            let slot = self.high_water;
            self.high_water += 1;
            return Some(slot);
        }
        None
    }

    fn release(&mut self, slot: SlotIndex) {
        self.active[slot as usize] = false;
        self.generation[slot as usize] = self.generation[slot as usize].wrapping_add(1);
        self.free.push(slot);
    }

    fn usage(&self) -> PoolUsage {
        let used = self.high_water as u64 - self.free.len() as u64;
        PoolUsage {
            used,
            free: self.capacity as u64 - used,
            capacity: self.capacity as u64,
        }
    }
}

/// The three entity pools plus the node-id index, mutated as one unit.
#[derive(Debug)]
pub struct Pools {
    nodes: NodePool,
    edges: EdgePool,
    embeddings: EmbeddingPool,
}

impl Pools {
    pub fn new(node_capacity: u32, edge_capacity: u32, embedding_capacity: u32, dim: usize) -> Self {
        Self {
            nodes: NodePool::new(node_capacity),
            edges: EdgePool::new(edge_capacity),
            embeddings: EmbeddingPool::new(embedding_capacity, dim),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embeddings.dim
    }

    pub fn node_usage(&self) -> PoolUsage {
        self.nodes.usage()
    }

    pub fn edge_usage(&self) -> PoolUsage {
        self.edges.usage()
    }

    pub fn embedding_usage(&self) -> PoolUsage {
        self.embeddings.usage()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.usage().used == 0
            && self.edges.usage().used == 0
            && self.embeddings.usage().used == 0
    }

    pub fn insert_node(&mut self, record: NodeRecord) -> Result<NodeHandle> {
        if self.nodes.index.contains_key(&record.id) {
            return Err(Error::DuplicateId(record.id));
        }
        let slot = self
            .nodes
            .alloc()
            .ok_or(Error::PoolExhausted("nodes"))?;
        let s = slot as usize;
        self.nodes.ids[s] = record.id;
        self.nodes.kinds[s] = record.kind;
        self.nodes.props[s] = record.props;
        self.nodes.active[s] = true;
        self.nodes.first_out[s] = NIL_SLOT;
        self.nodes.first_in[s] = NIL_SLOT;
        self.nodes.index.insert(record.id, slot);
        Ok(NodeHandle {
            slot,
            generation: self.nodes.generation[s],
        })
    }

    pub fn lookup_node(&self, id: NodeId) -> Option<NodeView> {
        let slot = *self.nodes.index.get(&id)?;
        let s = slot as usize;
        debug_assert!(self.nodes.active[s]);
        Some(NodeView {
            handle: NodeHandle {
                slot,
                generation: self.nodes.generation[s],
            },
            id: self.nodes.ids[s],
            kind: self.nodes.kinds[s],
            props: self.nodes.props[s],
        })
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.index.contains_key(&id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.high_water as usize)
            .filter(|&s| self.nodes.active[s])
            .map(|s| self.nodes.ids[s])
    }

    pub fn set_node_props(&mut self, id: NodeId, props: [u8; NODE_PROPS_LEN]) -> Result<()> {
        let slot = *self.nodes.index.get(&id).ok_or(Error::NotFound(id))?;
        self.nodes.props[slot as usize] = props;
        Ok(())
    }

    /// Deletes a node that has no incident edges. DETACH semantics live in
    /// [`Pools::detach_delete_node`].
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        let slot = *self.nodes.index.get(&id).ok_or(Error::NotFound(id))?;
        let s = slot as usize;
        if self.nodes.first_out[s] != NIL_SLOT || self.nodes.first_in[s] != NIL_SLOT {
            return Err(Error::HasIncidentEdges(id));
        }
        self.nodes.index.remove(&id);
        self.nodes.release(slot);
        self.remove_embedding(id);
        Ok(())
    }

    /// Every live edge incident to `id`, self-loops listed once.
    pub fn incident_edges(&self, id: NodeId) -> Vec<EdgeView> {
        let Some(&slot) = self.nodes.index.get(&id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = self.nodes.first_out[slot as usize];
        while cursor != NIL_SLOT {
            out.push(self.edge_view_at(cursor));
            cursor = self.edges.next_out[cursor as usize];
        }
        let mut cursor = self.nodes.first_in[slot as usize];
        while cursor != NIL_SLOT {
            let view = self.edge_view_at(cursor);
            if view.from != id {
                out.push(view);
            }
            cursor = self.edges.next_in[cursor as usize];
        }
        out
    }

    /// Deletes `id` together with all incident edges; returns how many edges
    /// were removed.
    pub fn detach_delete_node(&mut self, id: NodeId) -> Result<usize> {
        if !self.nodes.index.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        let incident = self.incident_edges(id);
        for edge in &incident {
            self.delete_edge(edge.handle)?;
        }
        self.delete_node(id)?;
        Ok(incident.len())
    }

    pub fn insert_edge(&mut self, record: EdgeRecord) -> Result<EdgeHandle> {
        let from_slot = *self
            .nodes
            .index
            .get(&record.from)
            .ok_or(Error::DanglingEndpoint(record.from))?;
        let to_slot = *self
            .nodes
            .index
            .get(&record.to)
            .ok_or(Error::DanglingEndpoint(record.to))?;
        let slot = self
            .edges
            .alloc()
            .ok_or(Error::PoolExhausted("edges"))?;
        let s = slot as usize;
        self.edges.from[s] = record.from;
        self.edges.to[s] = record.to;
        self.edges.labels[s] = record.label;
        self.edges.props[s] = record.props;
        self.edges.active[s] = true;
        self.edges.next_out[s] = self.nodes.first_out[from_slot as usize];
        self.nodes.first_out[from_slot as usize] = slot;
        self.edges.next_in[s] = self.nodes.first_in[to_slot as usize];
        self.nodes.first_in[to_slot as usize] = slot;
        Ok(EdgeHandle {
            slot,
            generation: self.edges.generation[s],
        })
    }

    pub fn lookup_edge_by_slot(&self, slot: SlotIndex) -> Option<EdgeView> {
        if slot >= self.edges.high_water || !self.edges.active[slot as usize] {
            return None;
        }
        Some(self.edge_view_at(slot))
    }

    pub fn lookup_edge(&self, handle: EdgeHandle) -> Option<EdgeView> {
        let view = self.lookup_edge_by_slot(handle.slot)?;
        (view.handle.generation == handle.generation).then_some(view)
    }

    pub fn delete_edge(&mut self, handle: EdgeHandle) -> Result<()> {
        let s = handle.slot as usize;
        if handle.slot >= self.edges.high_water || !self.edges.active[s] {
            return Err(Error::StaleHandle { slot: handle.slot });
        }
        if self.edges.generation[s] != handle.generation {
            return Err(Error::StaleHandle { slot: handle.slot });
        }
        let from_slot = self.nodes.index[&self.edges.from[s]];
        let to_slot = self.nodes.index[&self.edges.to[s]];
        unlink(
            &mut self.nodes.first_out[from_slot as usize],
            &mut self.edges.next_out,
            handle.slot,
        );
        unlink(
            &mut self.nodes.first_in[to_slot as usize],
            &mut self.edges.next_in,
            handle.slot,
        );
        self.edges.release(handle.slot);
        Ok(())
    }

    /// Deletes the first live edge matching `(from, to, label)`. Used by WAL
    /// replay, where entries identify edges by key rather than handle.
    pub fn delete_edge_by_key(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
    ) -> Result<()> {
        let Some(&from_slot) = self.nodes.index.get(&from) else {
            return Err(Error::WalCorrupt("delete of edge with unknown endpoint"));
        };
        let mut cursor = self.nodes.first_out[from_slot as usize];
        while cursor != NIL_SLOT {
            let s = cursor as usize;
            if self.edges.to[s] == to && self.edges.labels[s] == label {
                let handle = EdgeHandle {
                    slot: cursor,
                    generation: self.edges.generation[s],
                };
                return self.delete_edge(handle);
            }
            cursor = self.edges.next_out[s];
        }
        Err(Error::WalCorrupt("delete of unknown edge"))
    }

    pub fn neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        label: Option<EdgeLabel>,
    ) -> NeighborIter<'_> {
        let (out_head, in_head) = match self.nodes.index.get(&id) {
            Some(&slot) => {
                let s = slot as usize;
                let out = matches!(direction, Direction::Outgoing | Direction::Both)
                    .then_some(self.nodes.first_out[s])
                    .unwrap_or(NIL_SLOT);
                let inc = matches!(direction, Direction::Incoming | Direction::Both)
                    .then_some(self.nodes.first_in[s])
                    .unwrap_or(NIL_SLOT);
                (out, inc)
            }
            None => (NIL_SLOT, NIL_SLOT),
        };
        NeighborIter {
            pools: self,
            out_cursor: out_head,
            in_cursor: in_head,
            label,
        }
    }

    pub fn upsert_embedding(&mut self, node_id: NodeId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.embeddings.dim {
            return Err(Error::DimMismatch {
                expected: self.embeddings.dim,
                got: vector.len(),
            });
        }
        if !self.nodes.index.contains_key(&node_id) {
            return Err(Error::DanglingEndpoint(node_id));
        }
        let slot = match self.embeddings.index.get(&node_id) {
            Some(&slot) => slot,
            None => {
                let slot = self
                    .embeddings
                    .alloc()
                    .ok_or(Error::PoolExhausted("embeddings"))?;
                self.embeddings.node_ids[slot as usize] = node_id;
                self.embeddings.active[slot as usize] = true;
                self.embeddings.index.insert(node_id, slot);
                slot
            }
        };
        let dim = self.embeddings.dim;
        let base = slot as usize * dim;
        self.embeddings.vectors[base..base + dim].copy_from_slice(vector);
        Ok(())
    }

    pub fn get_embedding(&self, node_id: NodeId) -> Option<&[f32]> {
        let slot = *self.embeddings.index.get(&node_id)?;
        let dim = self.embeddings.dim;
        let base = slot as usize * dim;
        Some(&self.embeddings.vectors[base..base + dim])
    }

    pub fn embeddings(&self) -> impl Iterator<Item = (NodeId, &[f32])> + '_ {
        let dim = self.embeddings.dim;
        (0..self.embeddings.high_water as usize)
            .filter(|&s| self.embeddings.active[s])
            .map(move |s| {
                let base = s * dim;
                (
                    self.embeddings.node_ids[s],
                    &self.embeddings.vectors[base..base + dim],
                )
            })
    }

    pub fn node_views(&self) -> impl Iterator<Item = NodeView> + '_ {
        (0..self.nodes.high_water as usize)
            .filter(|&s| self.nodes.active[s])
            .map(|s| NodeView {
                handle: NodeHandle {
                    slot: s as SlotIndex,
                    generation: self.nodes.generation[s],
                },
                id: self.nodes.ids[s],
                kind: self.nodes.kinds[s],
                props: self.nodes.props[s],
            })
    }

    pub fn edge_views(&self) -> impl Iterator<Item = EdgeView> + '_ {
        (0..self.edges.high_water as usize)
            .filter(|&s| self.edges.active[s])
            .map(|s| self.edge_view_at(s as SlotIndex))
    }

    fn remove_embedding(&mut self, node_id: NodeId) {
        if let Some(slot) = self.embeddings.index.remove(&node_id) {
            self.embeddings.release(slot);
        }
    }

    fn edge_view_at(&self, slot: SlotIndex) -> EdgeView {
        let s = slot as usize;
        EdgeView {
            handle: EdgeHandle {
                slot,
                generation: self.edges.generation[s],
            },
            from: self.edges.from[s],
            to: self.edges.to[s],
            label: self.edges.labels[s],
            props: self.edges.props[s],
        }
    }
}

fn unlink(head: &mut SlotIndex, next: &mut [SlotIndex], target: SlotIndex) {
    if *head == target {
        *head = next[target as usize];
        return;
    }
    let mut cursor = *head;
    while cursor != NIL_SLOT {
        let s = cursor as usize;
        if next[s] == target {
            next[s] = next[target as usize];
            return;
        }
        cursor = next[s];
    }
}

/// Lazy iterator over incident edges; yields the outgoing list first, then
/// the incoming one when the direction asks for both.
pub struct NeighborIter<'a> {
    pools: &'a Pools,
    out_cursor: SlotIndex,
    in_cursor: SlotIndex,
    label: Option<EdgeLabel>,
}

impl Iterator for NeighborIter<'_> {
    type Item = EdgeInfo;

    fn next(&mut self) -> Option<EdgeInfo> {
        while self.out_cursor != NIL_SLOT {
            let slot = self.out_cursor;
            self.out_cursor = self.pools.edges.next_out[slot as usize];
            let view = self.pools.edge_view_at(slot);
            if self.label.is_none_or(|l| l == view.label) {
                return Some(EdgeInfo {
                    handle: view.handle,
                    from: view.from,
                    to: view.to,
                    label: view.label,
                });
            }
        }
        while self.in_cursor != NIL_SLOT {
            let slot = self.in_cursor;
            self.in_cursor = self.pools.edges.next_in[slot as usize];
            let view = self.pools.edge_view_at(slot);
            if self.label.is_none_or(|l| l == view.label) {
                return Some(EdgeInfo {
                    handle: view.handle,
                    from: view.from,
                    to: view.to,
                    label: view.label,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> Pools {
        Pools::new(8, 16, 4, 4)
    }

    #[test]
    fn insert_then_lookup_roundtrip() {
        let mut p = pools();
        let mut rec = NodeRecord::new(1, 7);
        rec.props[0] = 0xAB;
        let handle = p.insert_node(rec).unwrap();
        let view = p.lookup_node(1).unwrap();
        assert_eq!(view.handle, handle);
        assert_eq!(view.kind, 7);
        assert_eq!(view.props[0], 0xAB);
    }

    #[test]
    fn insert_delete_lookup_none() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.delete_node(1).unwrap();
        assert!(p.lookup_node(1).is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        assert!(matches!(
            p.insert_node(NodeRecord::new(1, 1)),
            Err(Error::DuplicateId(1))
        ));
    }

    #[test]
    fn capacity_boundary() {
        let mut p = pools();
        for id in 0..8 {
            p.insert_node(NodeRecord::new(id, 0)).unwrap();
        }
        assert!(matches!(
            p.insert_node(NodeRecord::new(100, 0)),
            Err(Error::PoolExhausted("nodes"))
        ));
        let usage = p.node_usage();
        assert_eq!(usage.used, 8);
        assert_eq!(usage.free, 0);
    }

    #[test]
    fn used_plus_free_is_capacity_after_every_mutation() {
        let mut p = pools();
        let check = |p: &Pools| {
            let u = p.node_usage();
            assert_eq!(u.used + u.free, u.capacity);
            let u = p.edge_usage();
            assert_eq!(u.used + u.free, u.capacity);
        };
        for id in 0..5 {
            p.insert_node(NodeRecord::new(id, 0)).unwrap();
            check(&p);
        }
        p.insert_edge(EdgeRecord::new(0, 1, 5)).unwrap();
        check(&p);
        p.delete_node(4).unwrap();
        check(&p);
        p.detach_delete_node(0).unwrap();
        check(&p);
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        let mut p = pools();
        let h1 = p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.delete_node(1).unwrap();
        let h2 = p.insert_node(NodeRecord::new(2, 0)).unwrap();
        assert_eq!(h1.slot, h2.slot);
        assert_eq!(h2.generation, h1.generation + 1);
    }

    #[test]
    fn dangling_endpoint_rejected() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        assert!(matches!(
            p.insert_edge(EdgeRecord::new(1, 9, 0)),
            Err(Error::DanglingEndpoint(9))
        ));
    }

    #[test]
    fn neighbors_by_direction_and_label() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_node(NodeRecord::new(2, 0)).unwrap();
        p.insert_edge(EdgeRecord::new(1, 2, 5)).unwrap();

        let out: Vec<_> = p.neighbors(1, Direction::Outgoing, None).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, 2);
        assert_eq!(out[0].label, 5);

        let inc: Vec<_> = p.neighbors(2, Direction::Incoming, None).collect();
        assert_eq!(inc.len(), 1);
        assert_eq!(inc[0].from, 1);

        assert_eq!(p.neighbors(1, Direction::Incoming, None).count(), 0);
        assert_eq!(p.neighbors(1, Direction::Outgoing, Some(6)).count(), 0);
    }

    #[test]
    fn self_loop_visible_both_ways() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_edge(EdgeRecord::new(1, 1, 3)).unwrap();
        assert_eq!(p.neighbors(1, Direction::Outgoing, None).count(), 1);
        assert_eq!(p.neighbors(1, Direction::Incoming, None).count(), 1);
    }

    #[test]
    fn parallel_edges_permitted() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_node(NodeRecord::new(2, 0)).unwrap();
        p.insert_edge(EdgeRecord::new(1, 2, 5)).unwrap();
        p.insert_edge(EdgeRecord::new(1, 2, 5)).unwrap();
        assert_eq!(p.neighbors(1, Direction::Outgoing, Some(5)).count(), 2);
    }

    #[test]
    fn delete_with_incident_edges_requires_detach() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_node(NodeRecord::new(2, 0)).unwrap();
        p.insert_edge(EdgeRecord::new(1, 2, 0)).unwrap();
        assert!(matches!(p.delete_node(1), Err(Error::HasIncidentEdges(1))));
        assert!(matches!(p.delete_node(2), Err(Error::HasIncidentEdges(2))));

        let removed = p.detach_delete_node(1).unwrap();
        assert_eq!(removed, 1);
        assert!(p.lookup_node(1).is_none());
        assert_eq!(p.neighbors(2, Direction::Incoming, None).count(), 0);
        p.delete_node(2).unwrap();
    }

    #[test]
    fn detach_delete_counts_self_loop_once() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_edge(EdgeRecord::new(1, 1, 0)).unwrap();
        assert_eq!(p.detach_delete_node(1).unwrap(), 1);
    }

    #[test]
    fn delete_edge_unlinks_middle_of_list() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_node(NodeRecord::new(2, 0)).unwrap();
        let _e1 = p.insert_edge(EdgeRecord::new(1, 2, 1)).unwrap();
        let e2 = p.insert_edge(EdgeRecord::new(1, 2, 2)).unwrap();
        let _e3 = p.insert_edge(EdgeRecord::new(1, 2, 3)).unwrap();
        p.delete_edge(e2).unwrap();
        let labels: Vec<_> = p
            .neighbors(1, Direction::Outgoing, None)
            .map(|e| e.label)
            .collect();
        assert_eq!(labels.len(), 2);
        assert!(!labels.contains(&2));
    }

    #[test]
    fn stale_edge_handle_rejected() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.insert_node(NodeRecord::new(2, 0)).unwrap();
        let e = p.insert_edge(EdgeRecord::new(1, 2, 0)).unwrap();
        p.delete_edge(e).unwrap();
        assert!(p.lookup_edge(e).is_none());
        assert!(matches!(p.delete_edge(e), Err(Error::StaleHandle { .. })));
    }

    #[test]
    fn embedding_upsert_and_drop_with_node() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        p.upsert_embedding(1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(p.get_embedding(1).unwrap(), &[1.0, 2.0, 3.0, 4.0]);

        // Overwrite keeps the single-slot-per-node rule.
        p.upsert_embedding(1, &[9.0, 9.0, 9.0, 9.0]).unwrap();
        assert_eq!(p.embedding_usage().used, 1);

        p.delete_node(1).unwrap();
        assert!(p.get_embedding(1).is_none());
        assert_eq!(p.embedding_usage().used, 0);
    }

    #[test]
    fn embedding_dim_mismatch() {
        let mut p = pools();
        p.insert_node(NodeRecord::new(1, 0)).unwrap();
        assert!(matches!(
            p.upsert_embedding(1, &[1.0]),
            Err(Error::DimMismatch { expected: 4, got: 1 })
        ));
    }
}
