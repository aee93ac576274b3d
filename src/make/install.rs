//! Path-level building with atomic install.
//!
//! [`McdbWriter`] accumulates a database in a temp file next to the target
//! and renames it into place on `finish`, so the target path always shows
//! either the previous database or the complete new one. Every other exit
//! (an error mid-build, `cancel`, plain drop) unlinks the temp file.

use std::fs::{File, Permissions};
use std::io::BufWriter;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::make::builder::McdbMake;
use crate::nointr;

pub struct McdbWriter {
    make: McdbMake<BufWriter<File>>,
    tmp: TempPath,
    target: PathBuf,
    mode: u32,
}

impl McdbWriter {
    /// Creates the temp sibling of `target` and prepares an empty build.
    ///
    /// A pre-existing target must be a regular file; its permission bits
    /// carry over to the replacement. With no pre-existing file the new
    /// database is installed user-read-only, matching its constant nature.
    pub fn create<P: AsRef<Path>>(target: P) -> Result<McdbWriter> {
        let target = target.as_ref().to_path_buf();
        let mode = match nointr::retry(|| std::fs::metadata(&target)) {
            Ok(md) if md.is_file() => md.mode() & 0o7777,
            Ok(_) => return Err(Error::Write(Some(libc::EINVAL))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => libc::S_IRUSR as u32,
            Err(e) => return Err(Error::write(&e)),
        };
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut prefix = target
            .file_name()
            .ok_or(Error::Usage)?
            .to_os_string();
        prefix.push(".");
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(dir)
            .map_err(|e| Error::write(&e))?;
        let (file, tmp) = tmp.into_parts();
        let make = McdbMake::start(BufWriter::new(file))?;
        Ok(McdbWriter {
            make,
            tmp,
            target,
            mode,
        })
    }

    /// Adds one record.
    pub fn add(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        self.make.add(key, data)
    }

    /// Records added so far.
    pub fn num_entries(&self) -> u32 {
        self.make.num_entries()
    }

    /// The format-level builder, for callers that stream records in pieces
    /// (the text parser does).
    pub fn make_mut(&mut self) -> &mut McdbMake<BufWriter<File>> {
        &mut self.make
    }

    /// Completes the build and renames the database into place. With
    /// `fsync`, data reaches stable storage before the rename.
    pub fn finish(self, fsync: bool) -> Result<()> {
        let w = self.make.finish()?;
        let file = w
            .into_inner()
            .map_err(|e| Error::Write(e.error().raw_os_error()))?;
        file.set_permissions(Permissions::from_mode(self.mode))
            .map_err(|e| Error::write(&e))?;
        if fsync {
            nointr::retry(|| file.sync_data()).map_err(|e| Error::write(&e))?;
        }
        drop(file);
        self.tmp
            .persist(&self.target)
            .map_err(|e| Error::write(&e.error))?;
        Ok(())
    }

    /// Abandons the build; the temp file is removed.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Mcdb;
    use tempfile::TempDir;

    fn temp_siblings(dir: &Path, stem: &str) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(stem) && n != stem)
            })
            .collect()
    }

    #[test]
    fn finish_installs_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.mcdb");
        let mut w = McdbWriter::create(&path).unwrap();
        w.add(b"one", b"Hello").unwrap();
        assert!(!path.exists());
        assert_eq!(temp_siblings(dir.path(), "db.mcdb").len(), 1);
        w.finish(true).unwrap();
        assert!(path.exists());
        assert!(temp_siblings(dir.path(), "db.mcdb").is_empty());

        let mut db = Mcdb::open(&path).unwrap();
        assert_eq!(db.find(b"one"), Some(&b"Hello"[..]));
    }

    #[test]
    fn cancel_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.mcdb");
        let mut w = McdbWriter::create(&path).unwrap();
        w.add(b"k", b"v").unwrap();
        w.cancel();
        assert!(!path.exists());
        assert!(temp_siblings(dir.path(), "db.mcdb").is_empty());
    }

    #[test]
    fn fresh_database_is_user_read_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.mcdb");
        let w = McdbWriter::create(&path).unwrap();
        w.finish(false).unwrap();
        let mode = std::fs::metadata(&path).unwrap().mode() & 0o7777;
        assert_eq!(mode, 0o400);
    }

    #[test]
    fn existing_mode_is_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.mcdb");
        McdbWriter::create(&path).unwrap().finish(false).unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();

        let mut w = McdbWriter::create(&path).unwrap();
        w.add(b"k", b"v").unwrap();
        w.finish(false).unwrap();
        let mode = std::fs::metadata(&path).unwrap().mode() & 0o7777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn non_regular_target_is_rejected() {
        let dir = TempDir::new().unwrap();
        match McdbWriter::create(dir.path()) {
            Err(Error::Write(Some(e))) => assert_eq!(e, libc::EINVAL),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn replacement_does_not_disturb_an_open_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.mcdb");
        let mut w = McdbWriter::create(&path).unwrap();
        w.add(b"k", b"old").unwrap();
        w.finish(false).unwrap();

        let mut db = Mcdb::open(&path).unwrap();
        assert_eq!(db.find(b"k"), Some(&b"old"[..]));

        let mut w = McdbWriter::create(&path).unwrap();
        w.add(b"k", b"new").unwrap();
        w.finish(false).unwrap();

        // Old registration, old snapshot.
        assert_eq!(db.find(b"k"), Some(&b"old"[..]));
        // New open, new contents.
        let mut fresh = Mcdb::open(&path).unwrap();
        assert_eq!(fresh.find(b"k"), Some(&b"new"[..]));
    }
}
