//! Advisory file locks shared between console processes.
//!
//! The server and one-shot CLI commands may mutate the same documents concurrently. Each
//! document `name` gets a sibling `name.lock`; writers hold it exclusively across
//! read-modify-write-rename, readers hold it shared while reloading.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held lock on a document. Released when dropped.
#[derive(Debug)]
pub struct DocumentLock {
    file: File,
    path: PathBuf,
}

impl DocumentLock {
    /// Block until no other holder remains.
    pub fn exclusive(document: &Path) -> io::Result<Self> {
        let (file, path) = open_lock_file(document)?;
        FileExt::lock_exclusive(&file)?;
        debug!(path = %path.display(), "exclusive document lock acquired");
        Ok(Self { file, path })
    }

    /// Block until no exclusive holder remains.
    pub fn shared(document: &Path) -> io::Result<Self> {
        let (file, path) = open_lock_file(document)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file, path })
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "document unlock failed");
        }
    }
}

pub fn lock_path_for(document: &Path) -> PathBuf {
    let name = document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    document.with_file_name(format!("{name}.lock"))
}

fn open_lock_file(document: &Path) -> io::Result<(File, PathBuf)> {
    let path = lock_path_for(document);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
    Ok((file, path))
}
