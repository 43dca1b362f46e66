//! Append-only write-ahead log.
//!
//! File layout: a 6-byte header (magic `NEND`, version u16 LE) followed by
//! packed entries with no inter-entry padding. Each entry is an op byte and
//! a fixed-length little-endian payload:
//!
//! | op | payload |
//! |----|---------|
//! | 1 InsertNode | id u64, kind u8, pad 7, props 128 |
//! | 2 DeleteNode | id u64 |
//! | 3 InsertEdge | from u64, to u64, label u16, props 64 |
//! | 4 DeleteEdge | from u64, to u64, label u16 |
//! | 5 SetNodeProps | id u64, props 128 |
//! | 6 EmbeddingUpsert | id u64, vector D×f32 |
//!
//! Appends go through a user-space buffer; entries larger than the buffer
//! bypass it after a flush. Recovery scans sequentially, truncates a torn
//! final entry, and rejects unknown op codes.

use crate::{Error, Result};
use nendb_api::{EDGE_PROPS_LEN, EdgeLabel, NODE_PROPS_LEN, NodeId, NodeKind};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const WAL_MAGIC: [u8; 4] = *b"NEND";
pub const WAL_VERSION: u16 = 1;
pub const WAL_HEADER_LEN: u64 = 6;

const OP_INSERT_NODE: u8 = 1;
const OP_DELETE_NODE: u8 = 2;
const OP_INSERT_EDGE: u8 = 3;
const OP_DELETE_EDGE: u8 = 4;
const OP_SET_NODE_PROPS: u8 = 5;
const OP_EMBEDDING_UPSERT: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum WalEntry {
    InsertNode {
        id: NodeId,
        kind: NodeKind,
        props: [u8; NODE_PROPS_LEN],
    },
    DeleteNode {
        id: NodeId,
    },
    InsertEdge {
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
        props: [u8; EDGE_PROPS_LEN],
    },
    DeleteEdge {
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
    },
    SetNodeProps {
        id: NodeId,
        props: [u8; NODE_PROPS_LEN],
    },
    EmbeddingUpsert {
        id: NodeId,
        vector: Vec<f32>,
    },
}

impl WalEntry {
    fn op(&self) -> u8 {
        match self {
            WalEntry::InsertNode { .. } => OP_INSERT_NODE,
            WalEntry::DeleteNode { .. } => OP_DELETE_NODE,
            WalEntry::InsertEdge { .. } => OP_INSERT_EDGE,
            WalEntry::DeleteEdge { .. } => OP_DELETE_EDGE,
            WalEntry::SetNodeProps { .. } => OP_SET_NODE_PROPS,
            WalEntry::EmbeddingUpsert { .. } => OP_EMBEDDING_UPSERT,
        }
    }

    fn payload_len(op: u8, emb_dim: usize) -> Result<usize> {
        match op {
            OP_INSERT_NODE => Ok(8 + 1 + 7 + NODE_PROPS_LEN),
            OP_DELETE_NODE => Ok(8),
            OP_INSERT_EDGE => Ok(8 + 8 + 2 + EDGE_PROPS_LEN),
            OP_DELETE_EDGE => Ok(8 + 8 + 2),
            OP_SET_NODE_PROPS => Ok(8 + NODE_PROPS_LEN),
            OP_EMBEDDING_UPSERT => Ok(8 + 4 * emb_dim),
            other => Err(Error::UnknownOp(other)),
        }
    }

    fn encode(&self, emb_dim: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1 + Self::payload_len(self.op(), emb_dim)?);
        out.push(self.op());
        match self {
            WalEntry::InsertNode { id, kind, props } => {
                out.extend_from_slice(&id.to_le_bytes());
                out.push(*kind);
                out.extend_from_slice(&[0u8; 7]);
                out.extend_from_slice(props);
            }
            WalEntry::DeleteNode { id } => {
                out.extend_from_slice(&id.to_le_bytes());
            }
            WalEntry::InsertEdge {
                from,
                to,
                label,
                props,
            } => {
                out.extend_from_slice(&from.to_le_bytes());
                out.extend_from_slice(&to.to_le_bytes());
                out.extend_from_slice(&label.to_le_bytes());
                out.extend_from_slice(props);
            }
            WalEntry::DeleteEdge { from, to, label } => {
                out.extend_from_slice(&from.to_le_bytes());
                out.extend_from_slice(&to.to_le_bytes());
                out.extend_from_slice(&label.to_le_bytes());
            }
            WalEntry::SetNodeProps { id, props } => {
                out.extend_from_slice(&id.to_le_bytes());
                out.extend_from_slice(props);
            }
            WalEntry::EmbeddingUpsert { id, vector } => {
                if vector.len() != emb_dim {
                    return Err(Error::DimMismatch {
                        expected: emb_dim,
                        got: vector.len(),
                    });
                }
                out.extend_from_slice(&id.to_le_bytes());
                for v in vector {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        Ok(out)
    }

    fn decode(op: u8, payload: &[u8]) -> Result<Self> {
        match op {
            OP_INSERT_NODE => {
                let id = read_u64(&payload[0..8]);
                let kind = payload[8];
                let mut props = [0u8; NODE_PROPS_LEN];
                props.copy_from_slice(&payload[16..16 + NODE_PROPS_LEN]);
                Ok(WalEntry::InsertNode { id, kind, props })
            }
            OP_DELETE_NODE => Ok(WalEntry::DeleteNode {
                id: read_u64(&payload[0..8]),
            }),
            OP_INSERT_EDGE => {
                let from = read_u64(&payload[0..8]);
                let to = read_u64(&payload[8..16]);
                let label = u16::from_le_bytes(payload[16..18].try_into().unwrap());
                let mut props = [0u8; EDGE_PROPS_LEN];
                props.copy_from_slice(&payload[18..18 + EDGE_PROPS_LEN]);
                Ok(WalEntry::InsertEdge {
                    from,
                    to,
                    label,
                    props,
                })
            }
            OP_DELETE_EDGE => Ok(WalEntry::DeleteEdge {
                from: read_u64(&payload[0..8]),
                to: read_u64(&payload[8..16]),
                label: u16::from_le_bytes(payload[16..18].try_into().unwrap()),
            }),
            OP_SET_NODE_PROPS => {
                let id = read_u64(&payload[0..8]);
                let mut props = [0u8; NODE_PROPS_LEN];
                props.copy_from_slice(&payload[8..8 + NODE_PROPS_LEN]);
                Ok(WalEntry::SetNodeProps { id, props })
            }
            OP_EMBEDDING_UPSERT => {
                let id = read_u64(&payload[0..8]);
                let vector = payload[8..]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                    .collect();
                Ok(WalEntry::EmbeddingUpsert { id, vector })
            }
            other => Err(Error::UnknownOp(other)),
        }
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes.try_into().unwrap())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    pub entries: u64,
    pub bytes: u64,
    /// Number of torn final entries discarded (0 or 1 per recovery pass).
    pub truncations: u64,
    /// File offset one past the last valid entry.
    pub end_offset: u64,
}

/// The append side of the log. Construction positions the file at its end;
/// callers run [`recover`] first to validate and truncate.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: File,
    buf: Vec<u8>,
    buffer_size: usize,
    emb_dim: usize,
    entries_written: u64,
    bytes_written: u64,
}

impl Wal {
    /// Creates a fresh log containing only the header, truncating any
    /// existing file.
    pub fn create(path: impl AsRef<Path>, buffer_size: usize, emb_dim: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        write_header(&mut file)?;
        Ok(Self {
            path,
            file,
            buf: Vec::with_capacity(buffer_size),
            buffer_size,
            emb_dim,
            entries_written: 0,
            bytes_written: 0,
        })
    }

    /// Opens an existing, already-recovered log for appending. `counters`
    /// carries the entry/byte totals observed during recovery so the
    /// monotonic counters continue from there.
    pub fn open_for_append(
        path: impl AsRef<Path>,
        buffer_size: usize,
        emb_dim: usize,
        recovered: RecoveryStats,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(Self {
            path,
            file,
            buf: Vec::with_capacity(buffer_size),
            buffer_size,
            emb_dim,
            entries_written: recovered.entries,
            bytes_written: recovered.bytes,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let encoded = entry.encode(self.emb_dim)?;
        if encoded.len() > self.buffer_size {
            // Oversized entries bypass the buffer.
            self.flush()?;
            self.file.write_all(&encoded)?;
        } else {
            if self.buf.len() + encoded.len() > self.buffer_size {
                self.flush()?;
            }
            self.buf.extend_from_slice(&encoded);
        }
        self.entries_written += 1;
        self.bytes_written += encoded.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Archives the current log as `<name>.<seq>` and starts a fresh one.
    pub fn rotate(&mut self, seq: u64) -> Result<()> {
        self.sync()?;
        let archived = segment_path(&self.path, seq);
        std::fs::rename(&self.path, &archived)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        write_header(&mut file)?;
        self.file = file;
        Ok(())
    }
}

fn write_header(file: &mut File) -> Result<()> {
    file.write_all(&WAL_MAGIC)?;
    file.write_all(&WAL_VERSION.to_le_bytes())?;
    file.sync_data()?;
    Ok(())
}

fn segment_path(active: &Path, seq: u64) -> PathBuf {
    let mut name = active
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!(".{seq}"));
    active.with_file_name(name)
}

/// Removes archived segments, keeping the `keep` most recent by sequence
/// number. Returns how many files were deleted.
pub fn delete_segments_keep_last(active: &Path, keep: usize) -> Result<usize> {
    let Some(dir) = active.parent() else {
        return Ok(0);
    };
    let prefix = format!(
        "{}.",
        active
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut seqs: Vec<u64> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(suffix) = name.strip_prefix(&prefix)
            && let Ok(seq) = suffix.parse::<u64>()
        {
            seqs.push(seq);
        }
    }
    seqs.sort_unstable();
    let drop_count = seqs.len().saturating_sub(keep);
    for seq in &seqs[..drop_count] {
        std::fs::remove_file(segment_path(active, *seq))?;
    }
    Ok(drop_count)
}

/// Validates the header and replays entries in order through `apply`,
/// starting at `from_offset` (pass [`WAL_HEADER_LEN`] for a full replay).
///
/// With `fix_tail`, an empty file gets a fresh header and a torn final
/// entry is discarded by truncating the file to the last valid boundary;
/// without it (read-only open) the file is left untouched and the torn
/// tail is only counted. Unknown op codes stop the scan with an error;
/// header mismatches are fatal.
pub fn recover(
    path: impl AsRef<Path>,
    from_offset: u64,
    emb_dim: usize,
    fix_tail: bool,
    mut apply: impl FnMut(WalEntry) -> Result<()>,
) -> Result<RecoveryStats> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .read(true)
        .write(fix_tail)
        .create(fix_tail)
        .truncate(false)
        .open(path)?;
    let len = file.metadata()?.len();

    if len == 0 {
        if fix_tail {
            write_header(&mut file)?;
        }
        return Ok(RecoveryStats {
            end_offset: WAL_HEADER_LEN,
            ..RecoveryStats::default()
        });
    }
    if len < WAL_HEADER_LEN {
        return Err(Error::WalCorrupt("truncated header"));
    }

    let mut header = [0u8; WAL_HEADER_LEN as usize];
    file.read_exact(&mut header)?;
    if header[0..4] != WAL_MAGIC {
        return Err(Error::WalCorrupt("bad magic"));
    }
    if u16::from_le_bytes(header[4..6].try_into().unwrap()) != WAL_VERSION {
        return Err(Error::WalCorrupt("unsupported version"));
    }

    let mut offset = from_offset.max(WAL_HEADER_LEN);
    if offset > len {
        return Err(Error::WalCorrupt("replay offset past end of log"));
    }
    file.seek(SeekFrom::Start(offset))?;

    let mut stats = RecoveryStats::default();
    let mut op_byte = [0u8; 1];
    loop {
        match file.read_exact(&mut op_byte) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::Io(e)),
        }
        let op = op_byte[0];
        let payload_len = WalEntry::payload_len(op, emb_dim)?;
        let mut payload = vec![0u8; payload_len];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Torn final entry: drop it and truncate to the last
                // valid boundary.
                if fix_tail {
                    file.set_len(offset)?;
                    file.sync_data()?;
                }
                stats.truncations += 1;
                break;
            }
            Err(e) => return Err(Error::Io(e)),
        }
        let entry = WalEntry::decode(op, &payload)?;
        apply(entry)?;
        offset += 1 + payload_len as u64;
        stats.entries += 1;
        stats.bytes += 1 + payload_len as u64;
    }

    stats.end_offset = offset;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DIM: usize = 4;

    fn collect_entries(path: &Path) -> (Vec<WalEntry>, RecoveryStats) {
        let mut out = Vec::new();
        let stats = recover(path, WAL_HEADER_LEN, DIM, true, |e| {
            out.push(e);
            Ok(())
        })
        .unwrap();
        (out, stats)
    }

    fn sample_entries() -> Vec<WalEntry> {
        let mut props = [0u8; NODE_PROPS_LEN];
        props[0] = 0x7F;
        vec![
            WalEntry::InsertNode {
                id: 1,
                kind: 7,
                props,
            },
            WalEntry::InsertNode {
                id: 2,
                kind: 0,
                props: [0u8; NODE_PROPS_LEN],
            },
            WalEntry::InsertEdge {
                from: 1,
                to: 2,
                label: 5,
                props: [0u8; EDGE_PROPS_LEN],
            },
            WalEntry::SetNodeProps {
                id: 1,
                props: [0x11; NODE_PROPS_LEN],
            },
            WalEntry::EmbeddingUpsert {
                id: 1,
                vector: vec![0.5, -0.5, 1.0, 2.0],
            },
            WalEntry::DeleteEdge {
                from: 1,
                to: 2,
                label: 5,
            },
            WalEntry::DeleteNode { id: 2 },
        ]
    }

    #[test]
    fn fresh_file_gets_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        let (entries, stats) = collect_entries(&path);
        assert!(entries.is_empty());
        assert_eq!(stats.end_offset, WAL_HEADER_LEN);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"NEND");
        assert_eq!(&bytes[4..6], &[0x01, 0x00]);
    }

    #[test]
    fn append_recover_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        let written = sample_entries();
        {
            let mut wal = Wal::create(&path, 64 * 1024, DIM).unwrap();
            for e in &written {
                wal.append(e).unwrap();
            }
            assert_eq!(wal.entries_written(), written.len() as u64);
            wal.sync().unwrap();
        }
        let (entries, stats) = collect_entries(&path);
        assert_eq!(entries, written);
        assert_eq!(stats.entries, written.len() as u64);
        assert_eq!(stats.truncations, 0);
    }

    #[test]
    fn buffered_entries_not_on_disk_before_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        let mut wal = Wal::create(&path, 64 * 1024, DIM).unwrap();
        wal.append(&WalEntry::DeleteNode { id: 1 }).unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            WAL_HEADER_LEN,
            "entry should still be in the user-space buffer"
        );
        wal.flush().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > WAL_HEADER_LEN);
    }

    #[test]
    fn small_buffer_flushes_when_full() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        // Buffer fits a single DeleteNode entry (9 bytes).
        let mut wal = Wal::create(&path, 16, DIM).unwrap();
        wal.append(&WalEntry::DeleteNode { id: 1 }).unwrap();
        wal.append(&WalEntry::DeleteNode { id: 2 }).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > WAL_HEADER_LEN);
        wal.sync().unwrap();
        let (entries, _) = collect_entries(&path);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn oversized_entry_bypasses_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        let mut wal = Wal::create(&path, 16, DIM).unwrap();
        wal.append(&WalEntry::InsertNode {
            id: 1,
            kind: 0,
            props: [0u8; NODE_PROPS_LEN],
        })
        .unwrap();
        // 145 bytes > 16-byte buffer: written straight through.
        assert!(std::fs::metadata(&path).unwrap().len() > NODE_PROPS_LEN as u64);
        wal.sync().unwrap();
        let (entries, _) = collect_entries(&path);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn torn_tail_is_truncated_and_counted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        {
            let mut wal = Wal::create(&path, 64 * 1024, DIM).unwrap();
            wal.append(&WalEntry::DeleteNode { id: 1 }).unwrap();
            wal.sync().unwrap();
        }
        let valid_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            // Op byte of an InsertNode plus a fragment of its payload.
            file.write_all(&[OP_INSERT_NODE, 0xAA, 0xBB]).unwrap();
        }

        let (entries, stats) = collect_entries(&path);
        assert_eq!(entries, vec![WalEntry::DeleteNode { id: 1 }]);
        assert_eq!(stats.truncations, 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), valid_len);

        // A second pass sees a clean log.
        let (_, stats) = collect_entries(&path);
        assert_eq!(stats.truncations, 0);
    }

    #[test]
    fn unknown_op_is_surfaced_not_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        {
            let mut wal = Wal::create(&path, 64 * 1024, DIM).unwrap();
            wal.append(&WalEntry::DeleteNode { id: 1 }).unwrap();
            wal.sync().unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xEE]).unwrap();
        }
        let err = recover(&path, WAL_HEADER_LEN, DIM, true, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::UnknownOp(0xEE)));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        std::fs::write(&path, b"XXXX\x01\x00").unwrap();
        let err = recover(&path, WAL_HEADER_LEN, DIM, true, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::WalCorrupt("bad magic")));
    }

    #[test]
    fn counters_continue_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        {
            let mut wal = Wal::create(&path, 64 * 1024, DIM).unwrap();
            wal.append(&WalEntry::DeleteNode { id: 1 }).unwrap();
            wal.sync().unwrap();
        }
        let (_, stats) = collect_entries(&path);
        let mut wal = Wal::open_for_append(&path, 64 * 1024, DIM, stats).unwrap();
        assert_eq!(wal.entries_written(), 1);
        wal.append(&WalEntry::DeleteNode { id: 2 }).unwrap();
        assert_eq!(wal.entries_written(), 2);
        wal.sync().unwrap();
        let (entries, _) = collect_entries(&path);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn rotation_archives_and_prunes_segments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nendb.wal");
        let mut wal = Wal::create(&path, 64 * 1024, DIM).unwrap();
        for seq in 1..=4 {
            wal.append(&WalEntry::DeleteNode { id: seq }).unwrap();
            wal.rotate(seq).unwrap();
        }
        assert!(dir.path().join("nendb.wal.1").exists());
        assert!(dir.path().join("nendb.wal.4").exists());

        let dropped = delete_segments_keep_last(&path, 2).unwrap();
        assert_eq!(dropped, 2);
        assert!(!dir.path().join("nendb.wal.1").exists());
        assert!(!dir.path().join("nendb.wal.2").exists());
        assert!(dir.path().join("nendb.wal.3").exists());
        assert!(dir.path().join("nendb.wal.4").exists());

        // Fresh active log after rotation contains only the header.
        let (entries, _) = collect_entries(&path);
        assert!(entries.is_empty());
    }
}
