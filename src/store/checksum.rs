//! Checksummed record framing for group records
//!
//! ```text
//! +------------------+
//! | Magic "RGRP"     | (4 bytes)
//! +------------------+
//! | Payload Length   | (u32 LE)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of payload)
//! +------------------+
//! | Payload          | (JSON-encoded group)
//! +------------------+
//! ```

use crc32fast::Hasher;

pub const RECORD_MAGIC: &[u8; 4] = b"RGRP";
pub const HEADER_LEN: usize = 12;

/// CRC32 (IEEE) over `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Frame a payload for storage.
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(RECORD_MAGIC);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&compute_checksum(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Unframe a stored record, returning the payload.
///
/// The error string describes the first check that failed.
pub fn decode_record(bytes: &[u8]) -> Result<&[u8], String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!(
            "record truncated: {} bytes, header needs {}",
            bytes.len(),
            HEADER_LEN
        ));
    }
    if &bytes[0..4] != RECORD_MAGIC {
        return Err("bad record magic".to_string());
    }

    let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let checksum = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let payload = &bytes[HEADER_LEN..];

    if payload.len() != len {
        return Err(format!(
            "payload length mismatch: header says {}, found {}",
            len,
            payload.len()
        ));
    }
    if !verify_checksum(payload, checksum) {
        return Err("checksum mismatch".to_string());
    }
    Ok(payload)
}
