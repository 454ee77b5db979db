pub mod dir;
pub mod error;
pub mod local;
pub mod memory;
pub mod shared;

pub use dir::DirStore;
pub use error::StoreError;
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore};
pub use memory::MemoryStore;
pub use shared::{SharedStore, StoreCapabilities, Subscription};

use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Return the per-user store root.
///
/// `$TENURE_HOME` if set, else `{data_dir}/tenure` (falls back to `~/.tenure`).
pub fn store_root() -> PathBuf {
    if let Some(home) = std::env::var_os("TENURE_HOME").filter(|v| !v.is_empty()) {
        PathBuf::from(home)
    } else if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("tenure")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".tenure")
    } else {
        PathBuf::from(".tenure-store")
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::NoParent(path.to_path_buf()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// File-based exclusive lock guard. Released on drop.
pub struct LockGuard {
    _file: fs::File,
}

/// Acquire an exclusive file lock (blocking). Creates the lock file if needed.
pub fn lock_file(path: &Path) -> Result<LockGuard, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { _file: file })
}
