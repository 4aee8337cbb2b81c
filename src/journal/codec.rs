// Journal framing
//
// file   := MAGIC version:u16 frame*
// frame  := len:u32 len_crc:u32 crc:u32 payload[len]     (little endian)
// payload = bincode(Vec<JournalRecord>), one frame per append
//
// `len_crc` covers the length field alone, so a damaged length is caught
// before it is trusted. Only a frame whose header checks out and whose
// payload runs past the end of the file counts as torn.

use super::record::{JournalRecord, JOURNAL_VERSION};
use crate::prelude::*;

pub const JOURNAL_MAGIC: &[u8; 4] = b"LISJ";
pub const HEADER_LEN: usize = 6;
pub const FRAME_HEADER_LEN: usize = 12;
/// Largest payload a single append may frame
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub fn encode_header() -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(JOURNAL_MAGIC);
    header[4..].copy_from_slice(&JOURNAL_VERSION.to_le_bytes());
    header
}

/// Frames every record of one append as a single unit: a crash mid-append
/// loses the whole batch, never part of it. An empty batch frames nothing.
pub fn encode_batch(records: &[JournalRecord]) -> Result<Vec<u8>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let payload = bincode::serialize(records)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(corrupt(format!(
            "batch of {} records is too large to frame ({} bytes)",
            records.len(),
            payload.len()
        )));
    }
    let len = (payload.len() as u32).to_le_bytes();
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&len);
    out.extend_from_slice(&crc32fast::hash(&len).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Result of scanning a journal file.
#[derive(Debug, Default)]
pub struct DecodedJournal {
    pub records: Vec<JournalRecord>,
    /// Bytes up to the end of the last complete frame
    pub valid_len: usize,
    /// Bytes after `valid_len` belonging to a frame cut short by a crash
    pub torn_bytes: usize,
}

/// Decodes a whole journal file. A final frame cut short is reported as torn
/// and excluded; any other damage is `CorruptJournal`.
pub fn decode(bytes: &[u8]) -> Result<DecodedJournal> {
    if bytes.len() < HEADER_LEN {
        // crashed while the header itself was being written
        if JOURNAL_MAGIC.starts_with(&bytes[..bytes.len().min(4)]) {
            return Ok(DecodedJournal {
                torn_bytes: bytes.len(),
                ..Default::default()
            });
        }
        return Err(corrupt("bad journal magic"));
    }
    if &bytes[..4] != JOURNAL_MAGIC {
        return Err(corrupt("bad journal magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != JOURNAL_VERSION {
        return Err(corrupt(format!("unsupported journal version {version}")));
    }

    let mut decoded = DecodedJournal {
        valid_len: HEADER_LEN,
        ..Default::default()
    };
    let mut pos = HEADER_LEN;
    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < FRAME_HEADER_LEN {
            decoded.torn_bytes = rest.len();
            break;
        }
        let len_bytes = [rest[0], rest[1], rest[2], rest[3]];
        let len_crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let crc = u32::from_le_bytes([rest[8], rest[9], rest[10], rest[11]]);
        if crc32fast::hash(&len_bytes) != len_crc {
            return Err(corrupt(format!("damaged frame header at byte {pos}")));
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(corrupt(format!(
                "frame at byte {pos} declares {len} bytes, limit is {MAX_FRAME_LEN}"
            )));
        }
        let Some(payload) = rest.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len) else {
            decoded.torn_bytes = rest.len();
            break;
        };
        if crc32fast::hash(payload) != crc {
            return Err(corrupt(format!("checksum mismatch in frame at byte {pos}")));
        }
        let batch: Vec<JournalRecord> = bincode::deserialize(payload)
            .map_err(|e| corrupt(format!("undecodable frame at byte {pos}: {e}")))?;
        if batch.is_empty() {
            return Err(corrupt(format!("empty frame at byte {pos}")));
        }
        decoded.records.extend(batch);
        pos += FRAME_HEADER_LEN + len;
        decoded.valid_len = pos;
    }
    Ok(decoded)
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptJournal {
        reason: reason.into(),
    }
}
