//! Per-domain advisory build lock.
//!
//! The lock is an exclusive OS file lock on `.build.lock`, held through an open
//! handle. The kernel drops it when the handle closes, including when the
//! process is killed mid-build, so a leftover file never blocks later builds.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::RagError;

/// Held for the duration of one commit; released when dropped.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    file: File,
}

impl BuildLock {
    /// Opens (or creates) `path` and takes an exclusive lock without waiting.
    ///
    /// # Errors
    /// [`RagError::BuildInProgress`] if another handle holds the lock.
    pub fn acquire(path: &Path, domain: &str) -> Result<Self, RagError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let holder = fs::read_to_string(path).unwrap_or_default();
                debug!(target: "doc_rag::index", lock = %path.display(), holder = holder.trim(), "build lock busy");
                return Err(RagError::BuildInProgress {
                    domain: domain.to_string(),
                    lock: path.to_path_buf(),
                });
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        // Owner info, overwriting whatever a dead holder left behind.
        if let Err(e) = record_owner(&mut file) {
            warn!(target: "doc_rag::index", lock = %path.display(), error = %e, "could not record lock owner");
        }
        debug!(target: "doc_rag::index", lock = %path.display(), domain, "build lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_owner(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    writeln!(
        file,
        "pid={} started={}",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    )
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        // The file stays in place; removing it would race a waiting opener.
        if let Err(e) = self.file.unlock() {
            warn!(target: "doc_rag::index", lock = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}
