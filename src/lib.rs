//! mcdb, a memory-mapped constant database.
//!
//! An mcdb file is an immutable key/value store derived from Bernstein's
//! cdb: a 2048-byte bucket header, the records in insertion order, and 256
//! open-addressed hash tables, with big-endian integers and 8-byte-aligned
//! tables so lookups are plain loads from a shared read-only mapping.
//!
//! Keys may repeat; `find` returns a key's first value and `find_next` the
//! rest, in insertion order. A database is never updated in place: a
//! builder writes a temp sibling and renames it over the target, and open
//! readers keep their snapshot until they `refresh`.
//!
//! ```no_run
//! use mcdb::{Mcdb, McdbWriter};
//!
//! # fn main() -> mcdb::Result<()> {
//! let mut w = McdbWriter::create("example.mcdb")?;
//! w.add(b"one", b"Hello")?;
//! w.add(b"two", b"World")?;
//! w.finish(true)?;
//!
//! let mut db = Mcdb::open("example.mcdb")?;
//! assert_eq!(db.find(b"one"), Some(&b"Hello"[..]));
//! assert_eq!(db.find(b"three"), None);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;
pub mod hash;
pub mod iter;
pub mod make;
pub mod mmap;
mod nointr;
pub mod reader;
pub mod textfmt;
pub mod uint32;

/// Error taxonomy shared by the whole crate.
pub use error::{Error, Result};
/// Seed of the record hash.
pub use hash::MCDB_HASH_INIT;
/// In-order record cursor.
pub use iter::McdbIter;
/// Format-level builder over any `Write + Seek` sink.
pub use make::McdbMake;
/// Path-level builder with atomic install.
pub use make::McdbWriter;
/// Shared mapping of one database generation.
pub use mmap::Map;
/// Reader: `find`/`find_next`/iteration over one registered snapshot.
pub use reader::Mcdb;
