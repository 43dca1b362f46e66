//! Key/value encoding for the fixed-size props blobs on nodes and edges.
//!
//! Layout: `[count: u8]` then per entry `[key_len: u8][key][tag: u8][value]`.
//! Values are Null (no bytes), Bool (1), Int (8, LE), Float (8, LE),
//! Text (`[len: u8][bytes]`). An encoding that does not fit the fixed blob
//! fails with `PropsTooLarge`; the blob on disk is zero-padded.

use crate::{Error, Result};
use nendb_api::PropValue;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;

fn encode_value(value: &PropValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        PropValue::Null => out.push(TAG_NULL),
        PropValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        PropValue::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        PropValue::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_le_bytes());
        }
        PropValue::Text(s) => {
            let len = u8::try_from(s.len()).map_err(|_| Error::PropsTooLarge)?;
            out.push(TAG_TEXT);
            out.push(len);
            out.extend_from_slice(s.as_bytes());
        }
    }
    Ok(())
}

/// Encodes `entries` into a `N`-byte blob, zero-padded.
pub fn encode_bag<const N: usize>(entries: &[(String, PropValue)]) -> Result<[u8; N]> {
    let count = u8::try_from(entries.len()).map_err(|_| Error::PropsTooLarge)?;
    let mut out = Vec::with_capacity(N);
    out.push(count);
    for (key, value) in entries {
        let key_len = u8::try_from(key.len()).map_err(|_| Error::PropsTooLarge)?;
        out.push(key_len);
        out.extend_from_slice(key.as_bytes());
        encode_value(value, &mut out)?;
    }
    if out.len() > N {
        return Err(Error::PropsTooLarge);
    }
    let mut blob = [0u8; N];
    blob[..out.len()].copy_from_slice(&out);
    Ok(blob)
}

/// Decodes a props blob produced by [`encode_bag`].
///
/// An all-zero blob decodes to an empty bag (count byte 0).
pub fn decode_bag(blob: &[u8]) -> Result<Vec<(String, PropValue)>> {
    let mut cursor = Cursor { bytes: blob, pos: 0 };
    let count = cursor.take_u8()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let key_len = cursor.take_u8()? as usize;
        let key_bytes = cursor.take(key_len)?;
        let key = std::str::from_utf8(key_bytes)
            .map_err(|_| Error::PropsCorrupt("invalid UTF-8 in props key"))?
            .to_string();
        let tag = cursor.take_u8()?;
        let value = match tag {
            TAG_NULL => PropValue::Null,
            TAG_BOOL => PropValue::Bool(cursor.take_u8()? != 0),
            TAG_INT => PropValue::Int(i64::from_le_bytes(cursor.take_array()?)),
            TAG_FLOAT => PropValue::Float(f64::from_le_bytes(cursor.take_array()?)),
            TAG_TEXT => {
                let len = cursor.take_u8()? as usize;
                let bytes = cursor.take(len)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| Error::PropsCorrupt("invalid UTF-8 in props value"))?;
                PropValue::Text(s.to_string())
            }
            _ => return Err(Error::PropsCorrupt("unknown props value tag")),
        };
        entries.push((key, value));
    }
    Ok(entries)
}

/// Looks up a single key in an encoded blob without building the full bag.
pub fn get(blob: &[u8], key: &str) -> Option<PropValue> {
    decode_bag(blob)
        .ok()?
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Re-encodes `blob` with `key` set to `value` (inserted or overwritten).
pub fn set<const N: usize>(blob: &[u8], key: &str, value: PropValue) -> Result<[u8; N]> {
    let mut entries = decode_bag(blob)?;
    match entries.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key.to_string(), value)),
    }
    encode_bag(&entries)
}

/// Re-encodes `blob` with `key` removed. Removing an absent key is a no-op.
pub fn remove<const N: usize>(blob: &[u8], key: &str) -> Result<[u8; N]> {
    let mut entries = decode_bag(blob)?;
    entries.retain(|(k, _)| k != key);
    encode_bag(&entries)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::PropsCorrupt("props blob truncated"));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        Ok(self.take(N)?.try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nendb_api::NODE_PROPS_LEN;

    #[test]
    fn empty_blob_decodes_to_empty_bag() {
        let blob = [0u8; NODE_PROPS_LEN];
        assert!(decode_bag(&blob).unwrap().is_empty());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let entries = vec![
            ("name".to_string(), PropValue::Text("ada".to_string())),
            ("age".to_string(), PropValue::Int(36)),
            ("score".to_string(), PropValue::Float(0.5)),
            ("active".to_string(), PropValue::Bool(true)),
            ("gone".to_string(), PropValue::Null),
        ];
        let blob: [u8; NODE_PROPS_LEN] = encode_bag(&entries).unwrap();
        assert_eq!(decode_bag(&blob).unwrap(), entries);
    }

    #[test]
    fn set_overwrites_and_inserts() {
        let blob = [0u8; NODE_PROPS_LEN];
        let blob: [u8; NODE_PROPS_LEN] = set(&blob, "x", PropValue::Int(1)).unwrap();
        let blob: [u8; NODE_PROPS_LEN] = set(&blob, "x", PropValue::Int(2)).unwrap();
        let blob: [u8; NODE_PROPS_LEN] = set(&blob, "y", PropValue::Bool(false)).unwrap();
        assert_eq!(get(&blob, "x"), Some(PropValue::Int(2)));
        assert_eq!(get(&blob, "y"), Some(PropValue::Bool(false)));
        assert_eq!(get(&blob, "z"), None);
    }

    #[test]
    fn remove_drops_key() {
        let blob = [0u8; NODE_PROPS_LEN];
        let blob: [u8; NODE_PROPS_LEN] = set(&blob, "x", PropValue::Int(1)).unwrap();
        let blob: [u8; NODE_PROPS_LEN] = remove(&blob, "x").unwrap();
        assert_eq!(get(&blob, "x"), None);
    }

    #[test]
    fn oversized_bag_is_rejected() {
        let entries = vec![(
            "k".to_string(),
            PropValue::Text("a".repeat(NODE_PROPS_LEN)),
        )];
        assert!(matches!(
            encode_bag::<NODE_PROPS_LEN>(&entries),
            Err(Error::PropsTooLarge)
        ));
    }

    #[test]
    fn edge_blob_is_smaller() {
        let entries = vec![("w".to_string(), PropValue::Float(2.5))];
        let blob: [u8; nendb_api::EDGE_PROPS_LEN] = encode_bag(&entries).unwrap();
        assert_eq!(get(&blob, "w"), Some(PropValue::Float(2.5)));
    }
}
