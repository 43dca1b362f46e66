//! The manifest points at the active snapshot and the WAL offset from which
//! replay resumes after loading it.
//!
//! Layout: magic `NENDMANI`, version u16, snapshot seq u64, WAL replay
//! offset u64, crc32 of everything before it. Written atomically via a temp
//! file and rename; a missing manifest means "no snapshot, replay the whole
//! log".

use crate::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub const MANIFEST_MAGIC: [u8; 8] = *b"NENDMANI";
pub const MANIFEST_VERSION: u16 = 1;

const MANIFEST_LEN: usize = 8 + 2 + 8 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    pub snapshot_seq: u64,
    pub wal_offset: u64,
}

impl Manifest {
    fn encode(&self) -> [u8; MANIFEST_LEN] {
        let mut out = [0u8; MANIFEST_LEN];
        out[0..8].copy_from_slice(&MANIFEST_MAGIC);
        out[8..10].copy_from_slice(&MANIFEST_VERSION.to_le_bytes());
        out[10..18].copy_from_slice(&self.snapshot_seq.to_le_bytes());
        out[18..26].copy_from_slice(&self.wal_offset.to_le_bytes());
        let crc = crc32fast::hash(&out[0..26]);
        out[26..30].copy_from_slice(&crc.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != MANIFEST_LEN {
            return Err(Error::ManifestCorrupt("wrong length"));
        }
        if bytes[0..8] != MANIFEST_MAGIC {
            return Err(Error::ManifestCorrupt("bad magic"));
        }
        if u16::from_le_bytes(bytes[8..10].try_into().unwrap()) != MANIFEST_VERSION {
            return Err(Error::ManifestCorrupt("unsupported version"));
        }
        let crc = u32::from_le_bytes(bytes[26..30].try_into().unwrap());
        if crc != crc32fast::hash(&bytes[0..26]) {
            return Err(Error::ManifestCorrupt("checksum mismatch"));
        }
        Ok(Self {
            snapshot_seq: u64::from_le_bytes(bytes[10..18].try_into().unwrap()),
            wal_offset: u64::from_le_bytes(bytes[18..26].try_into().unwrap()),
        })
    }

    pub fn store(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&self.encode())?;
            file.sync_data()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Returns `None` when no manifest exists yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path.as_ref()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        Self::decode(&bytes).map(Some)
    }
}
