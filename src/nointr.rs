//! Transparent retry of interrupted syscalls.
//!
//! Callers of the crate never see `EINTR`: buffered reads and writes go
//! through `read_exact`/`write_all` (which already retry), and the remaining
//! interruptible call sites (open, stat, fsync) go through [`retry`].

use std::io;

/// Runs `f` until it completes with something other than `EINTR`.
pub fn retry<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            r => return r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_success() {
        assert_eq!(retry(|| Ok::<_, io::Error>(7)).unwrap(), 7);
    }

    #[test]
    fn retries_interrupted_then_succeeds() {
        let mut left = 3;
        let r = retry(|| {
            if left > 0 {
                left -= 1;
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(42)
            }
        });
        assert_eq!(r.unwrap(), 42);
    }

    #[test]
    fn other_errors_surface() {
        let r: io::Result<()> = retry(|| Err(io::Error::from(io::ErrorKind::NotFound)));
        assert_eq!(r.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
