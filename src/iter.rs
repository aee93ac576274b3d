//! In-order traversal of the records region.

use crate::format::HEADER_SIZE;
use crate::mmap::Map;
use crate::uint32;

/// Borrowing cursor over the records of one map generation, yielding
/// `(key, data)` pairs in insertion order. Finite and one-shot; create a
/// new iterator to rescan.
pub struct McdbIter<'m> {
    bytes: &'m [u8],
    pos: u32,
    eod: u32,
    dpos: u32,
    klen: u32,
    dlen: u32,
}

impl<'m> McdbIter<'m> {
    pub(crate) fn new(map: &'m Map) -> McdbIter<'m> {
        McdbIter {
            bytes: map.bytes(),
            pos: HEADER_SIZE as u32,
            eod: map.eod(),
            dpos: 0,
            klen: 0,
            dlen: 0,
        }
    }

    /// File offset of the most recently yielded record's data.
    #[inline]
    pub fn data_pos(&self) -> u32 {
        self.dpos
    }

    /// Key length of the most recently yielded record.
    #[inline]
    pub fn key_len(&self) -> u32 {
        self.klen
    }

    /// Data length of the most recently yielded record.
    #[inline]
    pub fn data_len(&self) -> u32 {
        self.dlen
    }
}

impl<'m> Iterator for McdbIter<'m> {
    type Item = (&'m [u8], &'m [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        // Anything shorter than a record preamble before `eod` is the
        // padding that aligns the hash tables.
        if self.eod.saturating_sub(self.pos) < 8 {
            return None;
        }
        let p = self.pos as usize;
        let (klen, dlen) = uint32::unpack_pair(&self.bytes[p..p + 8]);
        let kstart = p + 8;
        let dstart = kstart + klen as usize;
        let dend = dstart + dlen as usize;
        if dend > self.eod as usize {
            // Lengths reaching into the tables: corrupt region, stop.
            return None;
        }
        self.pos = dend as u32;
        self.dpos = dstart as u32;
        self.klen = klen;
        self.dlen = dlen;
        Some((&self.bytes[kstart..dstart], &self.bytes[dstart..dend]))
    }
}
