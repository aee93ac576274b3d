//! Database construction: the format-level builder and the atomic
//! temp-file installer that together replace a database in one rename.

pub mod builder;
pub mod install;

pub use builder::McdbMake;
pub use install::McdbWriter;
