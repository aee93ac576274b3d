//! Error taxonomy shared by the whole crate.
//!
//! One closed set of kinds covers every failure: a malformed file or text
//! stream, an input or output syscall failure, a tripped allocation guard,
//! or caller misuse. Kinds that originate in a syscall carry the raw errno.
//! A missing key is never an error; lookups report it as `None`.

use std::error;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The file or text input violates the mcdb format.
    ReadFormat,
    /// Reading input failed.
    Read(Option<i32>),
    /// Writing output failed.
    Write(Option<i32>),
    /// An allocation bound was exceeded.
    Malloc(Option<i32>),
    /// The operation requested does not exist or was malformed.
    Usage,
}

impl Error {
    /// Classifies an I/O failure as an input error, keeping its errno.
    pub fn read(e: &io::Error) -> Error {
        Error::Read(e.raw_os_error())
    }

    /// Classifies an I/O failure as an output error, keeping its errno.
    pub fn write(e: &io::Error) -> Error {
        Error::Write(e.raw_os_error())
    }

    /// Underlying OS error number, when one was captured.
    pub fn errno(&self) -> Option<i32> {
        match *self {
            Error::Read(e) | Error::Write(e) | Error::Malloc(e) => e,
            Error::ReadFormat | Error::Usage => None,
        }
    }

    /// Process exit code for the command-line boundary: 101 for usage
    /// errors, 111 for everything else. (Key-not-found exits 100 but is not
    /// an `Error`.)
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage => 101,
            _ => 111,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            Error::ReadFormat => return f.write_str("read input: bad format"),
            Error::Usage => return f.write_str("bad usage"),
            Error::Read(_) => "read input",
            Error::Write(_) => "write output",
            Error::Malloc(_) => "malloc",
        };
        match self.errno() {
            Some(n) => write!(f, "{}: {}", what, io::Error::from_raw_os_error(n)),
            None => f.write_str(what),
        }
    }
}

impl error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Error::Usage.exit_code(), 101);
        assert_eq!(Error::ReadFormat.exit_code(), 111);
        assert_eq!(Error::Read(None).exit_code(), 111);
        assert_eq!(Error::Write(Some(libc::ENOSPC)).exit_code(), 111);
        assert_eq!(Error::Malloc(Some(libc::ENOMEM)).exit_code(), 111);
    }

    #[test]
    fn display_mentions_the_failing_stage() {
        assert_eq!(Error::ReadFormat.to_string(), "read input: bad format");
        assert!(Error::Read(None).to_string().starts_with("read input"));
        assert!(Error::Write(None).to_string().starts_with("write output"));
        let e = Error::Write(Some(libc::ENOSPC));
        assert!(e.to_string().len() > "write output".len());
    }

    #[test]
    fn errno_is_preserved_through_io_error() {
        let io_err = io::Error::from_raw_os_error(libc::EINVAL);
        assert_eq!(Error::write(&io_err), Error::Write(Some(libc::EINVAL)));
        assert_eq!(Error::read(&io_err).errno(), Some(libc::EINVAL));
    }
}
