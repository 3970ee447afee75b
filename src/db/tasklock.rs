//! Cooperative task locks.
//!
//! Two shells editing the same task description must not silently clobber
//! each other. While an external editor is open the owning process keeps a
//! lock row alive by refreshing its timestamp at the editor poll interval;
//! a row whose timestamp has not moved for two poll intervals belongs to a
//! dead process and may be stolen.

use chrono::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::db::model::{now_second, TaskLockRecord};
use crate::db::store::TaskStore;
use crate::error::{Error, Result};

/// How often a lock holder refreshes its row, in seconds. Also the
/// external-editor mtime poll interval.
pub const MTIME_POLL_INTERVAL_SECS: i64 = 10;

/// Manages lock rows on behalf of one process.
pub struct TaskLockManager {
    pid: u32,
}

impl Default for TaskLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskLockManager {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
        }
    }

    #[cfg(test)]
    fn with_pid(pid: u32) -> Self {
        Self { pid }
    }

    /// Acquire the lock on a task. A fresh row held by another process is
    /// reported as `LockHeld`; a stale row is stolen.
    pub fn acquire(&self, store: &mut TaskStore, task_uuid: Uuid) -> Result<()> {
        if let Some(lock) = store.lock_for(task_uuid) {
            if lock.pid != self.pid {
                if !is_stale(lock) {
                    return Err(Error::LockHeld { pid: lock.pid });
                }
                warn!(pid = lock.pid, %task_uuid, "stealing stale task lock");
            }
        }
        store.put_lock(TaskLockRecord {
            task_uuid,
            pid: self.pid,
            update_date: now_second(),
        })
    }

    /// Refresh the timestamp of a lock this process holds.
    pub fn update(&self, store: &mut TaskStore, task_uuid: Uuid) -> Result<()> {
        match store.lock_for(task_uuid) {
            Some(lock) if lock.pid == self.pid => store.put_lock(TaskLockRecord {
                task_uuid,
                pid: self.pid,
                update_date: now_second(),
            }),
            _ => Err(Error::Integrity(format!(
                "no lock held on task {task_uuid}"
            ))),
        }
    }

    /// Release a lock. Only the owning process may release; a foreign row
    /// is left alone.
    pub fn release(&self, store: &mut TaskStore, task_uuid: Uuid) -> Result<()> {
        match store.lock_for(task_uuid) {
            Some(lock) if lock.pid == self.pid => store.remove_lock(task_uuid),
            _ => Ok(()),
        }
    }
}

fn is_stale(lock: &TaskLockRecord) -> bool {
    now_second() - lock.update_date > Duration::seconds(2 * MTIME_POLL_INTERVAL_SECS)
}
