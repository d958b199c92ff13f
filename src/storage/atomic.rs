//! Write-to-temporary-then-rename file replacement.
//!
//! Readers of a path written through [`write_atomic`] observe either the previous
//! complete contents or the new complete contents, never a mixture.

use rand::RngCore;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Temporary sibling for `path`. Lives in the same directory so the rename stays on one
/// filesystem; the random suffix keeps concurrent writers from sharing a temp file.
fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut b = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut b);
    let tmp_name = format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        hex::encode(b)
    );
    Ok(path.with_file_name(tmp_name))
}

/// True for names produced by [`temp_path_for`]; leftovers of interrupted writes.
pub fn is_temp_artifact(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let n = n.to_string_lossy();
            n.starts_with('.') && n.ends_with(".tmp")
        })
        .unwrap_or(false)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Replace `path` with `bytes` atomically, creating parent directories as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let tmp = temp_path_for(path)?;
    let res = (|| {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, path)?;
        sync_directory(&parent)
    })();

    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}

/// Serialize `value` as pretty JSON (with trailing newline) and write it atomically.
pub fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let mut out = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    out.push(b'\n');
    write_atomic(path, &out)
}
