//! On-disk record codecs.
//!
//! Two record kinds share a data directory. A *data record* carries one
//! write (or delete) in a `<id>.data` segment file:
//!
//! ```text
//! +---------+--------------+-------------+---------------+-------+---------+
//! | crc:u32 | timestamp:i64| key_size:u32| value_size:u32|  key  |  value  |
//! +---------+--------------+-------------+---------------+-------+---------+
//! |  4 bytes|   8 bytes    |   4 bytes   |    4 bytes    |var len| var len |
//! +---------+--------------+-------------+---------------+-------+---------+
//! ```
//!
//! A *hint record* in the sidecar `<id>.hint` file locates the value of the
//! matching data record without touching value bytes:
//!
//! ```text
//! +-------------+---------------+----------------+--------------+-----------+-------+
//! | key_size:u32| value_size:u32| value_offset:u64| timestamp:i64| file_id:u64|  key |
//! +-------------+---------------+----------------+--------------+-----------+-------+
//! |   4 bytes   |    4 bytes    |     8 bytes    |    8 bytes   |  8 bytes  |var len|
//! +-------------+---------------+----------------+--------------+-----------+-------+
//! ```
//!
//! All multi-byte integers are big-endian. The CRC is CRC-32/IEEE over
//! `key || value` (the header is not covered). A delete is encoded as a
//! record whose `value_size` is the reserved [`TOMBSTONE`] marker and which
//! carries no value bytes; its CRC covers the key alone.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::Result;

/// Fixed size of a data record header.
pub const HEADER_SIZE: usize = 20;

/// Fixed part of a hint record, before the key bytes.
pub const HINT_HEADER_SIZE: usize = 32;

/// Reserved `value_size` marking a deleted key. Never a legal value length.
pub const TOMBSTONE: u32 = u32::MAX;

/// CRC-32/IEEE (reflected, polynomial 0xEDB88320).
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Checksum over the concatenation of key and value bytes.
pub fn checksum(key: &[u8], value: &[u8]) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(key);
    digest.update(value);
    digest.finalize()
}

/// Header of a data record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    pub crc: u32,
    pub timestamp: i64,
    pub key_size: u32,
    pub value_size: u32,
}

impl RecordHeader {
    pub fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE
    }

    /// Number of value bytes following the key. Zero for tombstones.
    pub fn value_len(&self) -> usize {
        if self.is_tombstone() {
            0
        } else {
            self.value_size as usize
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        (&mut buf[0..4]).write_u32::<BigEndian>(self.crc).unwrap();
        (&mut buf[4..12])
            .write_i64::<BigEndian>(self.timestamp)
            .unwrap();
        (&mut buf[12..16])
            .write_u32::<BigEndian>(self.key_size)
            .unwrap();
        (&mut buf[16..20])
            .write_u32::<BigEndian>(self.value_size)
            .unwrap();
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let crc = (&buf[0..4]).read_u32::<BigEndian>()?;
        let timestamp = (&buf[4..12]).read_i64::<BigEndian>()?;
        let key_size = (&buf[12..16]).read_u32::<BigEndian>()?;
        let value_size = (&buf[16..20]).read_u32::<BigEndian>()?;

        Ok(Self {
            crc,
            timestamp,
            key_size,
            value_size,
        })
    }
}

/// Encodes a full data record. `None` for the value writes a tombstone.
pub fn encode_record(key: &[u8], value: Option<&[u8]>, timestamp: i64) -> Vec<u8> {
    let value_bytes = value.unwrap_or(&[]);
    let header = RecordHeader {
        crc: checksum(key, value_bytes),
        timestamp,
        key_size: key.len() as u32,
        value_size: match value {
            Some(v) => v.len() as u32,
            None => TOMBSTONE,
        },
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + key.len() + value_bytes.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value_bytes);
    buf
}

/// Fixed part of a hint record. The key bytes follow on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HintEntry {
    pub key_size: u32,
    pub value_size: u32,
    pub value_offset: u64,
    pub timestamp: i64,
    pub file_id: u64,
}

impl HintEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE
    }

    /// Encodes the fixed part followed by the key bytes.
    pub fn encode(&self, key: &[u8]) -> Vec<u8> {
        debug_assert_eq!(self.key_size as usize, key.len());

        let mut buf = Vec::with_capacity(HINT_HEADER_SIZE + key.len());
        buf.write_u32::<BigEndian>(self.key_size).unwrap();
        buf.write_u32::<BigEndian>(self.value_size).unwrap();
        buf.write_u64::<BigEndian>(self.value_offset).unwrap();
        buf.write_i64::<BigEndian>(self.timestamp).unwrap();
        buf.write_u64::<BigEndian>(self.file_id).unwrap();
        buf.extend_from_slice(key);
        buf
    }

    pub fn decode(buf: &[u8; HINT_HEADER_SIZE]) -> Result<Self> {
        let key_size = (&buf[0..4]).read_u32::<BigEndian>()?;
        let value_size = (&buf[4..8]).read_u32::<BigEndian>()?;
        let value_offset = (&buf[8..16]).read_u64::<BigEndian>()?;
        let timestamp = (&buf[16..24]).read_i64::<BigEndian>()?;
        let file_id = (&buf[24..32]).read_u64::<BigEndian>()?;

        Ok(Self {
            key_size,
            value_size,
            value_offset,
            timestamp,
            file_id,
        })
    }
}
