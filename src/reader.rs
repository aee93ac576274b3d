//! Lookup cursor over an open database.
//!
//! [`Mcdb`] pairs a registration on one map generation with the probe state
//! of an in-progress search, so a `find` can be continued with `find_next`
//! to walk a key's values in insertion order. The byte slices handed out
//! borrow from the reader (and through it from its registered map); they
//! stay valid until the next `find*`/`refresh` call or until the reader is
//! dropped.
//!
//! Readers are cheap: make one per thread or per query session rather than
//! sharing one behind a lock.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::{self, HEADER_SIZE, SLOT_MASK};
use crate::hash::{self, MCDB_HASH_INIT};
use crate::iter::McdbIter;
use crate::mmap::Map;
use crate::uint32;

pub struct Mcdb {
    map: Arc<Map>,
    /// Slots examined under the current key; 0 means no search in progress.
    probes: u32,
    khash: u32,
    /// Next slot index to probe.
    kslot: u32,
    /// Table offset and slot count of the current key's bucket.
    hpos: u32,
    hslots: u32,
    /// Most recent match.
    dpos: u32,
    dlen: u32,
    klen: u32,
}

impl Mcdb {
    /// Opens the database at `path` and registers against its current
    /// contents.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Mcdb> {
        Ok(Mcdb::with_map(Map::open(path.as_ref())?))
    }

    /// Registers a reader against an existing map generation. Several
    /// readers (typically one per thread) may share one generation.
    pub fn with_map(map: Arc<Map>) -> Mcdb {
        Mcdb {
            map,
            probes: 0,
            khash: 0,
            kslot: 0,
            hpos: 0,
            hslots: 0,
            dpos: 0,
            dlen: 0,
            klen: 0,
        }
    }

    /// The map generation this reader is registered against.
    pub fn snapshot(&self) -> Arc<Map> {
        Arc::clone(&self.map)
    }

    /// Number of records, from the header.
    pub fn num_recs(&self) -> u32 {
        self.map.num_recs()
    }

    /// Re-registers against the newest generation if the file was replaced.
    /// Resets any in-progress find sequence; cached match offsets would be
    /// meaningless against the replacement.
    pub fn refresh(&mut self) -> Result<()> {
        self.map = self.map.refreshed()?;
        self.probes = 0;
        self.dpos = 0;
        self.dlen = 0;
        self.klen = 0;
        Ok(())
    }

    /// Resets the cursor; the next `find_next` starts a fresh search.
    #[inline]
    pub fn find_start(&mut self) {
        self.probes = 0;
    }

    /// First value stored under `key`.
    pub fn find(&mut self, key: &[u8]) -> Option<&[u8]> {
        self.find_start();
        self.find_next(key)
    }

    /// Next value stored under `key`, in insertion order. Continues the
    /// search begun by `find` (or `find_start`) with the same key.
    pub fn find_next(&mut self, key: &[u8]) -> Option<&[u8]> {
        if self.probes == 0 {
            let h = hash::hash(MCDB_HASH_INIT, key);
            let t = format::table(self.map.bytes(), (h & SLOT_MASK) as usize);
            if t.slots == 0 {
                return None;
            }
            self.khash = h;
            self.hpos = t.offset;
            self.hslots = t.slots;
            self.kslot = (h >> 8) % t.slots;
        }
        while self.probes < self.hslots {
            let off = (self.hpos + self.kslot * 8) as usize;
            let (shash, pos) = uint32::unpack_pair(&self.map.bytes()[off..off + 8]);
            self.probes += 1;
            self.kslot += 1;
            if self.kslot == self.hslots {
                self.kslot = 0;
            }
            if pos == 0 {
                // First empty slot ends the chain for this key.
                self.probes = self.hslots;
                return None;
            }
            if shash == self.khash {
                if let Some(dlen) = self.match_record(pos, key) {
                    self.dpos = pos + 8 + key.len() as u32;
                    self.dlen = dlen;
                    self.klen = key.len() as u32;
                    return Some(self.data());
                }
            }
        }
        None
    }

    /// Every value stored under `key`, in insertion order. Runs the whole
    /// find chain; the cursor is exhausted afterwards.
    pub fn find_all(&mut self, key: &[u8]) -> Vec<&[u8]> {
        let mut spans = Vec::new();
        self.find_start();
        while self.find_next(key).is_some() {
            spans.push((self.dpos, self.dlen));
        }
        let bytes = self.map.bytes();
        spans
            .into_iter()
            .map(|(p, l)| &bytes[p as usize..(p + l) as usize])
            .collect()
    }

    /// Compares the record at `pos` against `key`, returning the data
    /// length on a match. Positions outside the records region (a corrupt
    /// file) compare as non-matches; `validate_slots` is the check that
    /// reports them.
    fn match_record(&self, pos: u32, key: &[u8]) -> Option<u32> {
        let bytes = self.map.bytes();
        let p = pos as usize;
        let (klen, dlen) = uint32::unpack_pair(bytes.get(p..p + 8)?);
        if klen as usize != key.len() {
            return None;
        }
        let end = p.checked_add(8)?.checked_add(klen as usize)?.checked_add(dlen as usize)?;
        if end > self.map.eod() as usize {
            return None;
        }
        (&bytes[p + 8..p + 8 + klen as usize] == key).then_some(dlen)
    }

    /// Data of the most recent match; empty before any match.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.map.bytes()[self.dpos as usize..(self.dpos + self.dlen) as usize]
    }

    /// Key bytes of the most recent match.
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.map.bytes()[(self.dpos - self.klen) as usize..self.dpos as usize]
    }

    /// File offset of the most recent match's data. Identifies the record
    /// uniquely; scans use it to correlate find results with iteration.
    #[inline]
    pub fn data_pos(&self) -> u32 {
        self.dpos
    }

    /// Data length of the most recent match.
    #[inline]
    pub fn data_len(&self) -> u32 {
        self.dlen
    }

    /// Key length of the most recent match.
    #[inline]
    pub fn key_len(&self) -> u32 {
        self.klen
    }

    /// Slots examined by the current find sequence.
    #[inline]
    pub fn probes(&self) -> u32 {
        self.probes
    }

    /// Iterates all records of this reader's generation in insertion order.
    pub fn iter(&self) -> McdbIter<'_> {
        McdbIter::new(&self.map)
    }

    /// Verifies that every populated hash slot points into the records
    /// region. Scans that trust slot positions (stats, uniq) run this
    /// before relying on the file.
    pub fn validate_slots(&self) -> Result<()> {
        let bytes = self.map.bytes();
        let eod = self.map.eod();
        for i in 0..format::SLOTS {
            let t = format::table(bytes, i);
            for s in 0..t.slots {
                let off = (t.offset + s * 8) as usize;
                let (_, pos) = uint32::unpack_pair(&bytes[off..off + 8]);
                if pos != 0 && !((HEADER_SIZE as u32) <= pos && pos < eod) {
                    return Err(Error::ReadFormat);
                }
            }
        }
        Ok(())
    }
}
