//! Shared, refreshable memory maps of database files.
//!
//! A [`Map`] is one immutable generation of a database, mapped read-only in
//! full. Readers register against a generation by cloning its `Arc`; the
//! mapping is released when the last registration drops, so a registered
//! reader can never observe an unmap.
//!
//! When the file behind the map is replaced (the builder renames a new file
//! into place), [`Map::refreshed`] opens a successor and publishes it
//! through the map's `next` cell. Registrations taken afterwards land on the
//! successor, while readers already registered keep their snapshot until
//! they re-register. A generation is superseded at most once; losers of a
//! racing publication drop their redundant map and adopt the winner's.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use filetime::FileTime;
use memmap2::{Advice, Mmap};

use crate::error::{Error, Result};
use crate::format::{self, Layout, HEADER_SIZE};
use crate::nointr;

/// One mapped generation of a database file.
pub struct Map {
    mmap: Mmap,
    mtime: FileTime,
    path: PathBuf,
    layout: Layout,
    next: OnceLock<Arc<Map>>,
}

impl Map {
    /// Opens and maps `path` read-only, validating the header.
    ///
    /// The descriptor is closed once the mapping exists; only the mapping
    /// keeps the file contents reachable afterwards.
    pub fn open(path: &Path) -> Result<Arc<Map>> {
        let file = nointr::retry(|| File::open(path)).map_err(|e| Error::read(&e))?;
        let md = file.metadata().map_err(|e| Error::read(&e))?;
        if !md.is_file() {
            return Err(Error::Read(Some(libc::EINVAL)));
        }
        if md.len() < HEADER_SIZE as u64 || md.len() > u64::from(u32::MAX) {
            return Err(Error::ReadFormat);
        }
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::read(&e))?;
        let layout = format::validate(&mmap)?;
        Ok(Arc::new(Map {
            mmap,
            mtime: FileTime::from_last_modification_time(&md),
            path: path.to_path_buf(),
            layout,
            next: OnceLock::new(),
        }))
    }

    /// The whole file image.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// File size in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.mmap.len() as u32
    }

    /// Number of records, from the header.
    #[inline]
    pub fn num_recs(&self) -> u32 {
        self.layout.num_recs
    }

    /// End of the records region (start of the hash tables).
    #[inline]
    pub(crate) fn eod(&self) -> u32 {
        self.layout.eod
    }

    /// Path this generation was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hints the kernel about the upcoming access pattern. Scan-heavy
    /// operations (dump, stats) want `Sequential` and `WillNeed`.
    pub fn advise(&self, advice: Advice) -> Result<()> {
        self.mmap.advise(advice).map_err(|e| Error::read(&e))
    }

    /// Whether the file behind `path` has changed since this map was taken.
    pub fn stale(&self) -> Result<bool> {
        let md = nointr::retry(|| std::fs::metadata(&self.path)).map_err(|e| Error::read(&e))?;
        Ok(FileTime::from_last_modification_time(&md) != self.mtime)
    }

    /// Newest generation reachable from this one.
    pub fn latest(self: &Arc<Self>) -> Arc<Map> {
        let mut cur = Arc::clone(self);
        while let Some(next) = cur.next.get() {
            let next = Arc::clone(next);
            cur = next;
        }
        cur
    }

    /// Returns the up-to-date generation for this path, opening and
    /// publishing a successor if the file changed. Readers registered
    /// against older generations are unaffected until they re-register.
    pub fn refreshed(self: &Arc<Self>) -> Result<Arc<Map>> {
        let cur = self.latest();
        if !cur.stale()? {
            return Ok(cur);
        }
        let new = Map::open(&cur.path)?;
        match cur.next.set(Arc::clone(&new)) {
            Ok(()) => Ok(new),
            // Lost the publication race: another thread's successor is
            // already in place. `new` unmaps here.
            Err(_) => Ok(cur.latest()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make::McdbWriter;
    use tempfile::TempDir;

    fn build(path: &Path, records: &[(&[u8], &[u8])]) {
        let mut w = McdbWriter::create(path).unwrap();
        for (k, v) in records {
            w.add(k, v).unwrap();
        }
        w.finish(false).unwrap();
    }

    #[test]
    fn open_missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        match Map::open(&dir.path().join("nope.mcdb")) {
            Err(Error::Read(Some(e))) => assert_eq!(e, libc::ENOENT),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn open_short_file_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.mcdb");
        std::fs::write(&path, b"not a database").unwrap();
        match Map::open(&path) {
            Err(Error::ReadFormat) => {}
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn open_records_size_and_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mcdb");
        build(&path, &[(b"k", b"v"), (b"k2", b"v2")]);
        let map = Map::open(&path).unwrap();
        assert_eq!(map.num_recs(), 2);
        assert_eq!(map.size() as usize, map.bytes().len());
        assert!(map.eod() >= HEADER_SIZE as u32);
        assert!(!map.stale().unwrap());
    }

    #[test]
    fn refresh_keeps_old_generation_mapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mcdb");
        build(&path, &[(b"k", b"old")]);
        let old = Map::open(&path).unwrap();

        // Distinct mtime for the replacement; the clock alone may be too
        // coarse between two immediate builds.
        std::thread::sleep(std::time::Duration::from_millis(50));
        build(&path, &[(b"k", b"new"), (b"k2", b"v")]);

        let new = old.refreshed().unwrap();
        assert_eq!(new.num_recs(), 2);
        // The superseded generation still reads its own snapshot.
        assert_eq!(old.num_recs(), 1);
        // Following the chain from the old handle reaches the successor.
        assert_eq!(old.latest().num_recs(), 2);
        // A second refresh finds nothing new.
        assert_eq!(new.refreshed().unwrap().num_recs(), 2);
    }
}
