//! On-disk layout of an mcdb file.
//!
//! A file is three regions, all integers big-endian:
//!
//! 1. A 2048-byte header: 256 descriptors `(table_offset: u32, slots: u32)`,
//!    one per hash bucket.
//! 2. The records region: records `(klen: u32, dlen: u32, key, data)` packed
//!    back-to-back in insertion order, followed by zero padding to the next
//!    8-byte boundary.
//! 3. 256 open-addressed hash tables. Bucket `i` holds the records whose
//!    hash has low byte `i` and is sized at twice its record count; each
//!    slot is `(hash: u32, record_offset: u32)`, with offset 0 meaning
//!    empty.
//!
//! File offsets are `u32`, capping a database at 4 GiB.

use crate::error::{Error, Result};
use crate::uint32;

/// Number of top-level hash buckets.
pub const SLOTS: usize = 256;

/// Mask selecting a bucket from a hash value.
pub const SLOT_MASK: u32 = SLOTS as u32 - 1;

/// Byte size of the header region.
pub const HEADER_SIZE: usize = SLOTS * 8;

/// Upper bound on a single key or data field.
pub const MAX_FIELD_LEN: u32 = i32::MAX as u32 - 8;

/// One bucket descriptor from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    /// File offset of the bucket's slot array.
    pub offset: u32,
    /// Number of 8-byte slots (twice the bucket's record count).
    pub slots: u32,
}

/// Reads bucket `i`'s descriptor out of a file image.
#[inline]
pub fn table(bytes: &[u8], i: usize) -> Table {
    let (offset, slots) = uint32::unpack_pair(&bytes[i * 8..i * 8 + 8]);
    Table { offset, slots }
}

/// Figures derived from a validated header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Total records: the slot counts summed, halved.
    pub num_recs: u32,
    /// End of the records region, i.e. the smallest table offset.
    pub eod: u32,
}

/// Checks the structural invariants every readable file satisfies: a whole
/// header, every table 8-byte aligned and even-sized and inside the file,
/// and no table overlapping the header. Returns the derived layout.
pub fn validate(bytes: &[u8]) -> Result<Layout> {
    if bytes.len() < HEADER_SIZE || bytes.len() as u64 > u64::from(u32::MAX) {
        return Err(Error::ReadFormat);
    }
    let size = bytes.len() as u64;
    let mut num_slots = 0u64;
    let mut eod = u32::MAX;
    for i in 0..SLOTS {
        let t = table(bytes, i);
        if t.offset % 8 != 0 || t.slots % 2 != 0 {
            return Err(Error::ReadFormat);
        }
        if (t.offset as usize) < HEADER_SIZE
            || u64::from(t.offset) + u64::from(t.slots) * 8 > size
        {
            return Err(Error::ReadFormat);
        }
        num_slots += u64::from(t.slots);
        eod = eod.min(t.offset);
    }
    if num_slots / 2 > u64::from(u32::MAX) {
        return Err(Error::ReadFormat);
    }
    Ok(Layout {
        num_recs: (num_slots / 2) as u32,
        eod,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header for an empty database: every bucket's table is empty and
    /// starts right after the header.
    fn empty_header() -> Vec<u8> {
        let mut h = vec![0u8; HEADER_SIZE];
        for i in 0..SLOTS {
            uint32::pack(&mut h[i * 8..], HEADER_SIZE as u32);
        }
        h
    }

    #[test]
    fn empty_database_validates() {
        let layout = validate(&empty_header()).unwrap();
        assert_eq!(layout.num_recs, 0);
        assert_eq!(layout.eod, HEADER_SIZE as u32);
    }

    #[test]
    fn truncated_header_rejected() {
        assert_eq!(validate(&[0u8; 100]), Err(Error::ReadFormat));
        assert_eq!(validate(&[]), Err(Error::ReadFormat));
    }

    #[test]
    fn table_past_end_of_file_rejected() {
        let mut h = empty_header();
        // Bucket 7 claims 4 slots beyond the end of the file.
        uint32::pack(&mut h[7 * 8 + 4..], 4);
        assert_eq!(validate(&h), Err(Error::ReadFormat));
    }

    #[test]
    fn table_inside_header_rejected() {
        let mut h = empty_header();
        uint32::pack(&mut h[0..], 8);
        assert_eq!(validate(&h), Err(Error::ReadFormat));
    }

    #[test]
    fn misaligned_table_rejected() {
        let mut h = empty_header();
        h.extend_from_slice(&[0u8; 32]);
        uint32::pack(&mut h[0..], HEADER_SIZE as u32 + 4);
        assert_eq!(validate(&h), Err(Error::ReadFormat));
    }

    #[test]
    fn odd_slot_count_rejected() {
        let mut h = empty_header();
        h.extend_from_slice(&[0u8; 32]);
        uint32::pack(&mut h[3 * 8 + 4..], 3);
        assert_eq!(validate(&h), Err(Error::ReadFormat));
    }

    #[test]
    fn record_count_is_summed_and_halved() {
        let mut h = empty_header();
        h.extend_from_slice(&[0u8; 64]);
        uint32::pack(&mut h[0..], HEADER_SIZE as u32);
        uint32::pack(&mut h[4..], 4);
        uint32::pack(&mut h[10 * 8..], HEADER_SIZE as u32 + 32);
        uint32::pack(&mut h[10 * 8 + 4..], 2);
        let layout = validate(&h).unwrap();
        assert_eq!(layout.num_recs, 3);
        assert_eq!(layout.eod, HEADER_SIZE as u32);
    }
}
