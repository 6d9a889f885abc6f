// Durable writer - per-path advisory locking plus atomic replace.
//
// Writers for one dataset file serialize on its lock; the write itself goes
// through a temporary file in the destination directory followed by an
// atomic rename, so readers only ever see a complete old or new file.

use crate::error::{FlatstoreError, Result};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Suffix carried by in-flight temporary files. A crash between write and
/// rename can leave one behind; [`sweep_orphans`] removes them on startup.
pub const TMP_SUFFIX: &str = ".tmp";

pub struct DurableWriter {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl DurableWriter {
    pub fn new(timeout: Duration) -> Self {
        DurableWriter {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the exclusive lock for `path`, waiting at most the configured
    /// timeout. The returned lease holds the lock until dropped and is the
    /// only way to write the path.
    pub fn lock(&self, path: &Path) -> Result<PathLease> {
        let slot = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        let guard =
            slot.try_lock_arc_for(self.timeout)
                .ok_or_else(|| FlatstoreError::LockTimeout {
                    path: path.display().to_string(),
                    timeout: self.timeout,
                })?;
        Ok(PathLease {
            path: path.to_path_buf(),
            _guard: guard,
        })
    }

    /// Lock `path` and replace its content in one step. Callers that need a
    /// read-modify-write cycle take the lease themselves instead.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.lock(path)?.write(bytes)
    }
}

/// An exclusive lease on one path.
pub struct PathLease {
    path: PathBuf,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl PathLease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the leased path with `bytes`. The destination is
    /// never observable in a partially written state.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::Builder::new().suffix(TMP_SUFFIX).tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| FlatstoreError::Io(e.error))?;
        Ok(())
    }
}

/// Best-effort removal of temporary files orphaned by a crash between
/// write and rename. Failures are logged and never fatal.
pub fn sweep_orphans(dir: &Path) {
    let pattern = format!("{}/*{}", dir.display(), TMP_SUFFIX);
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("Orphan sweep skipped for {}: {e}", dir.display());
            return;
        }
    };
    for path in paths.filter_map(|p| p.ok()) {
        match fs::remove_file(&path) {
            Ok(()) => log::info!("Removed orphaned temp file {}", path.display()),
            Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
        }
    }
}
