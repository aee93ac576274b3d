//! Streaming construction of the on-disk hash file.
//!
//! [`McdbMake`] writes records to any `Write + Seek` sink as they arrive,
//! keeping one `(hash, position)` pair per record in chained fixed-size
//! nodes. `finish` bucket-sorts the pairs, lays out the 256 open-addressed
//! tables after the records, and writes the header back at offset 0.
//!
//! At most one builder may write to a given sink; the builder itself is
//! single-threaded.

use std::io::{Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::format::{HEADER_SIZE, MAX_FIELD_LEN, SLOTS, SLOT_MASK};
use crate::hash::{self, MCDB_HASH_INIT};
use crate::uint32;

/// Pairs per chained node.
const HPLIST: usize = 1000;

#[derive(Clone, Copy, Default)]
struct Pair {
    hash: u32,
    pos: u32,
}

struct HpList {
    hp: [Pair; HPLIST],
    num: usize,
    next: Option<Box<HpList>>,
}

impl HpList {
    fn boxed(next: Option<Box<HpList>>) -> Box<HpList> {
        Box::new(HpList {
            hp: [Pair::default(); HPLIST],
            num: 0,
            next,
        })
    }
}

impl Drop for HpList {
    // Unlink iteratively; a long chain must not recurse on drop.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut n) = next {
            next = n.next.take();
        }
    }
}

pub struct McdbMake<W> {
    w: W,
    /// Newest node of the pair chain.
    head: Option<Box<HpList>>,
    numentries: u32,
    /// Write position: offset the next record lands at.
    pos: u32,
    header: [u8; HEADER_SIZE],
}

impl<W: Write + Seek> McdbMake<W> {
    /// Starts a build on `w`, reserving the header region.
    pub fn start(mut w: W) -> Result<McdbMake<W>> {
        w.seek(SeekFrom::Start(HEADER_SIZE as u64))
            .map_err(|e| Error::write(&e))?;
        Ok(McdbMake {
            w,
            head: None,
            numentries: 0,
            pos: HEADER_SIZE as u32,
            header: [0; HEADER_SIZE],
        })
    }

    /// Records added so far.
    pub fn num_entries(&self) -> u32 {
        self.numentries
    }

    fn pos_plus(&mut self, len: u32) -> Result<()> {
        self.pos = self
            .pos
            .checked_add(len)
            .ok_or(Error::Write(Some(libc::ENOMEM)))?;
        Ok(())
    }

    fn check_field(len: usize) -> Result<u32> {
        if len as u64 > u64::from(MAX_FIELD_LEN) {
            return Err(Error::Write(Some(libc::ENOMEM)));
        }
        Ok(len as u32)
    }

    /// Writes the 8-byte record preamble. Oversized fields are rejected
    /// before any byte goes out.
    pub fn add_begin(&mut self, klen: usize, dlen: usize) -> Result<()> {
        let klen = Self::check_field(klen)?;
        let dlen = Self::check_field(dlen)?;
        let mut buf = [0u8; 8];
        uint32::pack(&mut buf, klen);
        uint32::pack(&mut buf[4..], dlen);
        self.w.write_all(&buf).map_err(|e| Error::write(&e))
    }

    /// Appends raw bytes of the record being assembled (key bytes first,
    /// then data bytes).
    pub fn add_buf(&mut self, bytes: &[u8]) -> Result<()> {
        self.w.write_all(bytes).map_err(|e| Error::write(&e))
    }

    /// Completes the record begun by `add_begin`: remembers `(hash, start)`
    /// and advances the write position past it. `hash` must cover exactly
    /// the key bytes.
    pub fn add_end(&mut self, klen: usize, dlen: usize, hash: u32) -> Result<()> {
        let klen = Self::check_field(klen)?;
        let dlen = Self::check_field(dlen)?;
        let full = match &self.head {
            Some(node) => node.num >= HPLIST,
            None => true,
        };
        if full {
            self.head = Some(HpList::boxed(self.head.take()));
        }
        if let Some(node) = &mut self.head {
            node.hp[node.num] = Pair {
                hash,
                pos: self.pos,
            };
            node.num += 1;
        }
        self.numentries = self
            .numentries
            .checked_add(1)
            .ok_or(Error::Malloc(Some(libc::ENOMEM)))?;
        self.pos_plus(8)?;
        self.pos_plus(klen)?;
        self.pos_plus(dlen)
    }

    /// Adds one complete record.
    pub fn add(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        self.add_begin(key.len(), data.len())?;
        self.add_buf(key)?;
        self.add_buf(data)?;
        self.add_end(key.len(), data.len(), hash::hash(MCDB_HASH_INIT, key))
    }

    /// Emits the hash tables and the header; returns the flushed sink.
    pub fn finish(mut self) -> Result<W> {
        let mut count = [0u32; SLOTS];
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            for pair in &n.hp[..n.num] {
                count[(pair.hash & SLOT_MASK) as usize] += 1;
            }
            node = n.next.as_deref();
        }

        // One contiguous work area: the bucket-sorted entries, then room
        // for the largest table (twice its bucket's count).
        let max_table = count.iter().map(|&c| u64::from(c) * 2).max().unwrap_or(0);
        let work = max_table.max(1) + u64::from(self.numentries);
        if work > u64::from(u32::MAX) / 8 {
            return Err(Error::Malloc(Some(libc::ENOMEM)));
        }
        let mut split = vec![Pair::default(); work as usize];

        // start[i]: where bucket i's entries begin within `split` once the
        // backward fill below completes.
        let mut start = [0u32; SLOTS];
        let mut acc = 0u32;
        for (s, c) in start.iter_mut().zip(count.iter()) {
            acc += c;
            *s = acc;
        }
        // The chain runs newest to oldest; walking each node backward too
        // and filling each bucket from its top leaves every bucket in
        // insertion order. Probing then places older duplicates earlier in
        // the probe sequence, which is what keeps find/findnext ordered.
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            for pair in n.hp[..n.num].iter().rev() {
                let b = (pair.hash & SLOT_MASK) as usize;
                start[b] -= 1;
                split[start[b] as usize] = *pair;
            }
            node = n.next.as_deref();
        }

        // Records end here; the tables start on the next 8-byte boundary.
        let pad = (8 - self.pos % 8) % 8;
        if pad != 0 {
            self.w
                .write_all(&[0u8; 8][..pad as usize])
                .map_err(|e| Error::write(&e))?;
            self.pos_plus(pad)?;
        }

        let (entries, table) = split.split_at_mut(self.numentries as usize);
        let mut slot = [0u8; 8];
        for i in 0..SLOTS {
            let len = count[i] * 2;
            uint32::pack(&mut self.header[i * 8..], self.pos);
            uint32::pack(&mut self.header[i * 8 + 4..], len);

            let tbl = &mut table[..len as usize];
            tbl.fill(Pair::default());
            let first = start[i] as usize;
            for pair in &entries[first..first + count[i] as usize] {
                let mut at = ((pair.hash >> 8) % len) as usize;
                while tbl[at].pos != 0 {
                    at += 1;
                    if at == len as usize {
                        at = 0;
                    }
                }
                tbl[at] = *pair;
            }
            for s in tbl.iter() {
                uint32::pack(&mut slot, s.hash);
                uint32::pack(&mut slot[4..], s.pos);
                self.w.write_all(&slot).map_err(|e| Error::write(&e))?;
            }
            // Widen: a pathological single-bucket table can push len * 8
            // past u32 even when pos itself has not wrapped yet.
            let newpos = u64::from(self.pos) + u64::from(len) * 8;
            if newpos > u64::from(u32::MAX) {
                return Err(Error::Write(Some(libc::ENOMEM)));
            }
            self.pos = newpos as u32;
        }

        self.w.flush().map_err(|e| Error::write(&e))?;
        self.w
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::write(&e))?;
        self.w.write_all(&self.header).map_err(|e| Error::write(&e))?;
        self.w.flush().map_err(|e| Error::write(&e))?;
        Ok(self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{self, Table};
    use std::io::Cursor;

    fn build(records: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut m = McdbMake::start(Cursor::new(Vec::new())).unwrap();
        for (k, v) in records {
            m.add(k, v).unwrap();
        }
        m.finish().unwrap().into_inner()
    }

    #[test]
    fn empty_build_is_header_plus_empty_tables() {
        let bytes = build(&[]);
        assert_eq!(bytes.len(), HEADER_SIZE);
        let layout = format::validate(&bytes).unwrap();
        assert_eq!(layout.num_recs, 0);
        assert_eq!(layout.eod as usize, HEADER_SIZE);
        for i in 0..SLOTS {
            assert_eq!(
                format::table(&bytes, i),
                Table {
                    offset: HEADER_SIZE as u32,
                    slots: 0
                }
            );
        }
    }

    #[test]
    fn single_record_layout() {
        let bytes = build(&[(b"one", b"Hello")]);
        let layout = format::validate(&bytes).unwrap();
        assert_eq!(layout.num_recs, 1);

        // Record at 2048: (3, 5, "one", "Hello"), then padding to 8.
        assert_eq!(uint32::unpack(&bytes[HEADER_SIZE..]), 3);
        assert_eq!(uint32::unpack(&bytes[HEADER_SIZE + 4..]), 5);
        assert_eq!(&bytes[HEADER_SIZE + 8..HEADER_SIZE + 11], b"one");
        assert_eq!(&bytes[HEADER_SIZE + 11..HEADER_SIZE + 16], b"Hello");
        assert_eq!(layout.eod as usize, HEADER_SIZE + 16);

        // The record's bucket has a double-sized table holding its hash.
        let h = hash::hash(MCDB_HASH_INIT, b"one");
        let t = format::table(&bytes, (h & SLOT_MASK) as usize);
        assert_eq!(t.slots, 2);
        let mut hit = false;
        for s in 0..t.slots {
            let off = (t.offset + s * 8) as usize;
            let (sh, sp) = uint32::unpack_pair(&bytes[off..]);
            if sp != 0 {
                assert_eq!(sh, h);
                assert_eq!(sp, HEADER_SIZE as u32);
                hit = true;
            }
        }
        assert!(hit);
    }

    #[test]
    fn tables_are_eight_byte_aligned() {
        // 3+4 = 7 bytes of record payload forces one padding byte.
        let bytes = build(&[(b"abc", b"wxyz")]);
        let layout = format::validate(&bytes).unwrap();
        assert_eq!(layout.eod % 8, 0);
        assert_eq!(layout.eod as usize, HEADER_SIZE + 8 + 7 + 1);
        assert_eq!(bytes[HEADER_SIZE + 15], 0);
    }

    #[test]
    fn oversized_field_rejected() {
        let mut m = McdbMake::start(Cursor::new(Vec::new())).unwrap();
        match m.add_begin(i32::MAX as usize, 1) {
            Err(Error::Write(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        match m.add_begin(1, MAX_FIELD_LEN as usize + 1) {
            Err(Error::Write(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        // The cap itself is allowed through the length check.
        assert!(McdbMake::<Cursor<Vec<u8>>>::check_field(MAX_FIELD_LEN as usize).is_ok());
    }

    #[test]
    fn pair_chain_grows_past_one_node() {
        let mut m = McdbMake::start(Cursor::new(Vec::new())).unwrap();
        for i in 0..(HPLIST + 10) {
            let key = format!("k{:05}", i);
            m.add(key.as_bytes(), b"v").unwrap();
        }
        assert_eq!(m.num_entries() as usize, HPLIST + 10);
        let bytes = m.finish().unwrap().into_inner();
        let layout = format::validate(&bytes).unwrap();
        assert_eq!(layout.num_recs as usize, HPLIST + 10);
    }

    #[test]
    fn duplicate_keys_all_present_in_the_table() {
        let bytes = build(&[(b"a", b"1"), (b"a", b"2"), (b"a", b"3")]);
        let h = hash::hash(MCDB_HASH_INIT, b"a");
        let t = format::table(&bytes, (h & SLOT_MASK) as usize);
        assert_eq!(t.slots, 6);
        let mut positions = Vec::new();
        for s in 0..t.slots {
            let off = (t.offset + s * 8) as usize;
            let (sh, sp) = uint32::unpack_pair(&bytes[off..]);
            if sp != 0 {
                assert_eq!(sh, h);
                positions.push(sp);
            }
        }
        assert_eq!(positions.len(), 3);
    }
}
