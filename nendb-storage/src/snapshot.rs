//! Point-in-time serialization of the live pools.
//!
//! Layout: magic `NEND_SNP`, version u16, node/edge/embedding counts (u64),
//! embedding dim (u32), then dense slot-ordered dumps of every active node,
//! edge, and embedding. Inactive slots are skipped, so the loader
//! re-allocates slots in encounter order: slot indices are not preserved
//! across snapshot/restore, only ids are stable.

use crate::pool::{EdgeRecord, NodeRecord, Pools};
use crate::{Error, Result};
use nendb_api::{EDGE_PROPS_LEN, NODE_PROPS_LEN};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const SNAPSHOT_MAGIC: [u8; 8] = *b"NEND_SNP";
pub const SNAPSHOT_VERSION: u16 = 1;

const NODE_RECORD_LEN: usize = 8 + 1 + 7 + NODE_PROPS_LEN;
const EDGE_RECORD_LEN: usize = 8 + 8 + 2 + EDGE_PROPS_LEN;

pub fn write_snapshot(pools: &Pools, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("tmp");
    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        let mut w = BufWriter::new(file);

        let node_count = pools.node_usage().used;
        let edge_count = pools.edge_usage().used;
        let emb_count = pools.embedding_usage().used;
        let dim = pools.embedding_dim();

        w.write_all(&SNAPSHOT_MAGIC)?;
        w.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        w.write_all(&node_count.to_le_bytes())?;
        w.write_all(&edge_count.to_le_bytes())?;
        w.write_all(&emb_count.to_le_bytes())?;
        w.write_all(&(dim as u32).to_le_bytes())?;

        for node in pools.node_views() {
            w.write_all(&node.id.to_le_bytes())?;
            w.write_all(&[node.kind])?;
            w.write_all(&[0u8; 7])?;
            w.write_all(&node.props)?;
        }
        for edge in pools.edge_views() {
            w.write_all(&edge.from.to_le_bytes())?;
            w.write_all(&edge.to.to_le_bytes())?;
            w.write_all(&edge.label.to_le_bytes())?;
            w.write_all(&edge.props)?;
        }
        for (node_id, vector) in pools.embeddings() {
            w.write_all(&node_id.to_le_bytes())?;
            for v in vector {
                w.write_all(&v.to_le_bytes())?;
            }
        }
        w.flush()?;
        w.into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .sync_data()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a snapshot into `pools`, which must be empty.
pub fn load_snapshot(pools: &mut Pools, path: impl AsRef<Path>) -> Result<()> {
    if !pools.is_empty() {
        return Err(Error::NotEmpty);
    }
    let file = File::open(path.as_ref())?;
    let mut r = BufReader::new(file);

    let mut header = [0u8; 8 + 2 + 8 + 8 + 8 + 4];
    r.read_exact(&mut header)
        .map_err(|_| Error::SnapshotCorrupt("truncated header"))?;
    if header[0..8] != SNAPSHOT_MAGIC {
        return Err(Error::SnapshotCorrupt("bad magic"));
    }
    if u16::from_le_bytes(header[8..10].try_into().unwrap()) != SNAPSHOT_VERSION {
        return Err(Error::SnapshotCorrupt("unsupported version"));
    }
    let node_count = u64::from_le_bytes(header[10..18].try_into().unwrap());
    let edge_count = u64::from_le_bytes(header[18..26].try_into().unwrap());
    let emb_count = u64::from_le_bytes(header[26..34].try_into().unwrap());
    let dim = u32::from_le_bytes(header[34..38].try_into().unwrap()) as usize;
    if dim != pools.embedding_dim() {
        return Err(Error::DimMismatch {
            expected: pools.embedding_dim(),
            got: dim,
        });
    }

    let mut node_buf = [0u8; NODE_RECORD_LEN];
    for _ in 0..node_count {
        r.read_exact(&mut node_buf)
            .map_err(|_| Error::SnapshotCorrupt("truncated node record"))?;
        let mut record = NodeRecord::new(
            u64::from_le_bytes(node_buf[0..8].try_into().unwrap()),
            node_buf[8],
        );
        record.props.copy_from_slice(&node_buf[16..16 + NODE_PROPS_LEN]);
        pools.insert_node(record)?;
    }

    let mut edge_buf = [0u8; EDGE_RECORD_LEN];
    for _ in 0..edge_count {
        r.read_exact(&mut edge_buf)
            .map_err(|_| Error::SnapshotCorrupt("truncated edge record"))?;
        let mut record = EdgeRecord::new(
            u64::from_le_bytes(edge_buf[0..8].try_into().unwrap()),
            u64::from_le_bytes(edge_buf[8..16].try_into().unwrap()),
            u16::from_le_bytes(edge_buf[16..18].try_into().unwrap()),
        );
        record.props.copy_from_slice(&edge_buf[18..18 + EDGE_PROPS_LEN]);
        pools.insert_edge(record)?;
    }

    let mut id_buf = [0u8; 8];
    let mut vec_buf = vec![0u8; 4 * dim];
    for _ in 0..emb_count {
        r.read_exact(&mut id_buf)
            .map_err(|_| Error::SnapshotCorrupt("truncated embedding record"))?;
        r.read_exact(&mut vec_buf)
            .map_err(|_| Error::SnapshotCorrupt("truncated embedding record"))?;
        let node_id = u64::from_le_bytes(id_buf);
        let vector: Vec<f32> = vec_buf
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        pools.upsert_embedding(node_id, &vector)?;
    }

    Ok(())
}
