// Checkpoint images
//
// image := MAGIC version:u16 crc:u32 payload      (little endian)
// payload = bincode(NamespaceImage)

use super::record::JOURNAL_VERSION;
use crate::leases::Lease;
use crate::namespace::PathEntry;
use crate::prelude::*;

pub const IMAGE_MAGIC: &[u8; 4] = b"LISI";
const IMAGE_HEADER_LEN: usize = 10;

/// Full namespace state as of `last_txid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceImage {
    pub last_txid: u64,
    pub last_timestamp: HlcTimestamp,
    pub next_inode: InodeId,
    pub entries: Vec<PathEntry>,
    pub leases: Vec<Lease>,
}

impl NamespaceImage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(IMAGE_HEADER_LEN + payload.len());
        out.extend_from_slice(IMAGE_MAGIC);
        out.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptImage { reason };

        if bytes.len() < IMAGE_HEADER_LEN || &bytes[..4] != IMAGE_MAGIC {
            return Err(corrupt("bad image header".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != JOURNAL_VERSION {
            return Err(corrupt(format!("unsupported image version {version}")));
        }
        let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let payload = &bytes[IMAGE_HEADER_LEN..];
        if crc32fast::hash(payload) != crc {
            return Err(corrupt("image checksum mismatch".to_string()));
        }
        bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))
    }
}
