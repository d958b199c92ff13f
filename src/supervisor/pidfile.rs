//! Pid files: one plain-text decimal process id per organ.

use crate::storage::atomic;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Recorded pid, or `None` when the file is missing, unreadable, non-numeric or not a
/// positive id.
pub fn read_pid(path: &Path) -> Option<i32> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "pid file unreadable");
            }
            return None;
        }
    };
    match raw.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Some(pid),
        _ => {
            debug!(path = %path.display(), "pid file does not hold a valid pid");
            None
        }
    }
}

/// Record `pid` atomically; the previous contents survive any failure.
pub fn write_pid(path: &Path, pid: i32) -> io::Result<()> {
    atomic::write_atomic(path, format!("{pid}\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_only_positive_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("organ.pid");
        assert_eq!(read_pid(&p), None);

        for junk in ["", "abc", "-4", "0", "12x"] {
            fs::write(&p, junk).unwrap();
            assert_eq!(read_pid(&p), None, "{junk:?}");
        }

        fs::write(&p, " 4242\n").unwrap();
        assert_eq!(read_pid(&p), Some(4242));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("run").join("organ.pid");
        write_pid(&p, 77).unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "77\n");
        assert_eq!(read_pid(&p), Some(77));
    }
}
