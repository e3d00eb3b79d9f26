//! Commit log framing.
//!
//! ```text
//! header: | magic (8) | version (1) | flags (1) | salt (16) |
//! frame:  | len (4, LE) | crc32 (4, LE) | payload (len) |
//! ```
//!
//! The CRC covers the payload as written, so it is checked before any
//! decryption. A frame that is cut short or fails its CRC at the tail of the
//! log is treated as a torn write.

use crate::crypto::SALT_SIZE;
use crate::error::{StorageError, StorageResult};

/// Magic bytes at the start of every commit log.
pub const LOG_MAGIC: [u8; 8] = *b"ARBORLOG";
/// Current log format version.
pub const LOG_VERSION: u8 = 1;
/// Header flag: frame payloads are sealed.
pub const FLAG_ENCRYPTED: u8 = 0x01;
/// Size of the log header in bytes.
pub const HEADER_SIZE: usize = LOG_MAGIC.len() + 2 + SALT_SIZE;
/// Size of a frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;
/// Largest accepted frame payload.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Parsed log header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// Header flags.
    pub flags: u8,
    /// HKDF salt for sealed logs.
    pub salt: [u8; SALT_SIZE],
}

impl LogHeader {
    /// Returns true if frames are sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Serializes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..8].copy_from_slice(&LOG_MAGIC);
        out[8] = LOG_VERSION;
        out[9] = self.flags;
        out[10..].copy_from_slice(&self.salt);
        out
    }

    /// Parses a header.
    ///
    /// # Errors
    ///
    /// Returns an error on a short buffer, bad magic or unknown version.
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StorageError::corrupted("log header truncated"));
        }
        if bytes[..8] != LOG_MAGIC {
            return Err(StorageError::corrupted("bad log magic"));
        }
        if bytes[8] != LOG_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported log version {}",
                bytes[8]
            )));
        }
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[10..HEADER_SIZE]);
        Ok(Self {
            flags: bytes[9],
            salt,
        })
    }
}

/// Wraps a payload in a frame.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&compute_crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Result of reading the frame at some offset.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead<'a> {
    /// A complete, valid frame and the offset just past it.
    Frame {
        /// The frame payload.
        payload: &'a [u8],
        /// Offset of the next frame.
        next: usize,
    },
    /// No bytes remain.
    End,
    /// The remaining bytes do not form a valid frame.
    Torn,
}

/// Reads the frame starting at `offset`.
#[must_use]
pub fn read_frame(buf: &[u8], offset: usize) -> FrameRead<'_> {
    let rest = &buf[offset.min(buf.len())..];
    if rest.is_empty() {
        return FrameRead::End;
    }
    if rest.len() < FRAME_HEADER_SIZE {
        return FrameRead::Torn;
    }
    let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
    if len > MAX_FRAME_SIZE || rest.len() < FRAME_HEADER_SIZE + len {
        return FrameRead::Torn;
    }
    let payload = &rest[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
    if compute_crc32(payload) != crc {
        return FrameRead::Torn;
    }
    FrameRead::Frame {
        payload,
        next: offset + FRAME_HEADER_SIZE + len,
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn header_roundtrip_and_validation() {
        let header = LogHeader {
            flags: FLAG_ENCRYPTED,
            salt: [7u8; SALT_SIZE],
        };
        let bytes = header.encode();
        assert_eq!(LogHeader::decode(&bytes).unwrap(), header);
        assert!(header.is_encrypted());

        let mut bad = bytes;
        bad[0] = b'X';
        assert!(LogHeader::decode(&bad).is_err());
        assert!(LogHeader::decode(&bytes[..5]).is_err());
    }

    #[test]
    fn frames_read_in_sequence() {
        let mut log = encode_frame(b"first");
        log.extend(encode_frame(b"second"));

        let FrameRead::Frame { payload, next } = read_frame(&log, 0) else {
            panic!("expected frame");
        };
        assert_eq!(payload, b"first");
        let FrameRead::Frame { payload, next } = read_frame(&log, next) else {
            panic!("expected frame");
        };
        assert_eq!(payload, b"second");
        assert_eq!(read_frame(&log, next), FrameRead::End);
    }

    #[test]
    fn torn_tail_is_detected() {
        let full = encode_frame(b"payload");
        for cut in 1..full.len() {
            assert_eq!(read_frame(&full[..cut], 0), FrameRead::Torn, "cut at {cut}");
        }

        let mut flipped = full.clone();
        flipped[FRAME_HEADER_SIZE] ^= 0xFF;
        assert_eq!(read_frame(&flipped, 0), FrameRead::Torn);
    }
}
