//! Filesystem layout and concurrency-safe file operations.
//!
//! Two concerns live here:
//! - Resolution of the standard yokadi directories (data, cache, runtime)
//!   honoring the documented environment overrides.
//! - Atomic writes (temp file + rename) and cross-process advisory locking
//!   used by the store snapshot and the dump tree.
//!
//! # Directory layout
//!
//! ```text
//! <dataDir>/yokadi.json        # store snapshot (YOKADI_DB overrides the path)
//! <cacheDir>/db/               # sync clone of the dump repository
//! <cacheDir>/history           # CLI history (owned by the shell layer)
//! <runtimeDir>/                # daemon pid file (owned by the daemon)
//! ```

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Retry interval when waiting for a contended lock.
const LOCK_RETRY_INTERVAL_MS: u64 = 50;

const APP_NAME: &str = "yokadi";

/// Resolved locations for yokadi state.
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
    cache_dir: PathBuf,
    runtime_dir: Option<PathBuf>,
    db_override: Option<PathBuf>,
}

impl Paths {
    /// Resolve the standard directories from the environment.
    ///
    /// `YOKADI_DB` (deprecated but still honored) overrides the snapshot
    /// path; `XDG_DATA_HOME`, `XDG_CACHE_HOME` and `XDG_RUNTIME_DIR`
    /// override the base directories; otherwise the platform defaults from
    /// `directories` apply.
    pub fn resolve() -> Result<Self> {
        let data_dir = match env::var_os("XDG_DATA_HOME") {
            Some(base) if !base.is_empty() => PathBuf::from(base).join(APP_NAME),
            _ => project_dirs()?.data_dir().to_path_buf(),
        };
        let cache_dir = match env::var_os("XDG_CACHE_HOME") {
            Some(base) if !base.is_empty() => PathBuf::from(base).join(APP_NAME),
            _ => project_dirs()?.cache_dir().to_path_buf(),
        };
        let runtime_dir = env::var_os("XDG_RUNTIME_DIR")
            .filter(|value| !value.is_empty())
            .map(|base| PathBuf::from(base).join(APP_NAME));
        let db_override = env::var_os("YOKADI_DB")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            data_dir,
            cache_dir,
            runtime_dir,
            db_override,
        })
    }

    /// Build paths rooted at an explicit directory. Used by tests and by
    /// callers that manage their own layout.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
            runtime_dir: Some(root.join("runtime")),
            db_override: None,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn runtime_dir(&self) -> Option<&Path> {
        self.runtime_dir.as_deref()
    }

    /// Path of the store snapshot.
    pub fn db_file(&self) -> PathBuf {
        match &self.db_override {
            Some(path) => path.clone(),
            None => self.data_dir.join("yokadi.json"),
        }
    }

    /// Path of the local sync clone of the dump repository.
    pub fn sync_dir(&self) -> PathBuf {
        self.cache_dir.join("db")
    }

    /// Create the data and cache directories.
    pub fn init_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .ok_or_else(|| Error::Io(io::Error::other("cannot determine home directory")))
}

// =============================================================================
// File locking
// =============================================================================

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2 can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// A file lock guard that releases the lock when dropped.
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout.
    ///
    /// The lock file is created if it does not exist. Fails with
    /// `LockFailed` when the lock cannot be acquired within the timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => {
                    return Err(Error::Io(e));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

// =============================================================================
// Atomic writes and JSON helpers
// =============================================================================

/// Atomically write data to a file.
///
/// Writes to a temporary file in the same directory, then renames it onto
/// the target path, so readers see either the old or the new content.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    io::Write::write_all(&mut temp, data)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|err| Error::Io(err.error))?;

    Ok(())
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let data = fs::read(path.as_ref())?;
    Ok(serde_json::from_slice(&data)?)
}

/// Serialize a value as pretty JSON and write it atomically.
///
/// Pretty output keeps the dump files line-oriented, which is what lets the
/// VCS merge independent field edits without conflict.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    write_atomic(path, &data)
}

/// Write JSON while holding an exclusive lock on `<path>.lock`.
pub fn write_json_locked<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let lock_path = PathBuf::from(format!("{}.lock", path.display()));
    let _lock = FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;
    write_json(path, value)
}
