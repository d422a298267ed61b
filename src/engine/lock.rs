//! Exclusive writer lock for the backing file
//!
//! Serializes the mutate-persist sequence of concurrent store handles via
//! a sibling lock file. Stale locks (dead holder process or expired
//! timeout) are reclaimed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Locks older than this are considered abandoned even if the pid check
/// is inconclusive.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("database is locked by PID {pid} since {since}")]
    AlreadyLocked { pid: u32, since: DateTime<Utc> },

    #[error("lock IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock file corrupt: {0}")]
    Corrupt(String),
}

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

impl LockInfo {
    fn new(timeout_secs: u64) -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            timeout_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.acquired_at);
        elapsed.num_seconds() < 0 || elapsed.num_seconds() as u64 > self.timeout_secs
    }

    /// Check whether the holding process still exists
    pub fn is_process_alive(&self) -> bool {
        if self.pid == std::process::id() {
            return true;
        }

        #[cfg(unix)]
        {
            use std::process::Command;
            Command::new("kill")
                .args(["-0", &self.pid.to_string()])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        }

        #[cfg(windows)]
        {
            use std::process::Command;
            Command::new("tasklist")
                .args(["/FI", &format!("PID eq {}", self.pid)])
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).contains(&self.pid.to_string()))
                .unwrap_or(false)
        }

        #[cfg(not(any(unix, windows)))]
        true
    }
}

/// Lock manager for one backing file
pub struct WriterLock {
    lock_path: PathBuf,
    timeout_secs: u64,
}

impl WriterLock {
    /// Lock file lives next to the database file as `<file>.lock`
    pub fn for_database(db_path: &Path) -> Self {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(".lock");
        Self {
            lock_path: PathBuf::from(name),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Acquire the lock, reclaiming it if the previous holder is gone.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        if let Some(existing) = self.read_lock() {
            if existing.is_process_alive() && !existing.is_expired() {
                return Err(LockError::AlreadyLocked {
                    pid: existing.pid,
                    since: existing.acquired_at,
                });
            }
            if existing.is_process_alive() {
                warn!(
                    pid = existing.pid,
                    "reclaiming expired lock from a still-running holder"
                );
            }
            // Stale lock, remove it
            let _ = fs::remove_file(&self.lock_path);
        }

        let info = LockInfo::new(self.timeout_secs);
        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| LockError::Corrupt(e.to_string()))?;

        // create_new keeps two reclaiming processes from both winning
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    LockError::AlreadyLocked {
                        pid: self.read_lock().map(|i| i.pid).unwrap_or(0),
                        since: Utc::now(),
                    }
                } else {
                    LockError::Io(e)
                }
            })?;
        file.write_all(content.as_bytes())?;

        Ok(LockGuard {
            lock_path: self.lock_path.clone(),
            info,
        })
    }

    fn read_lock(&self) -> Option<LockInfo> {
        fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
    }
}

/// RAII guard that releases the lock on drop
pub struct LockGuard {
    lock_path: PathBuf,
    info: LockInfo,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only release a lock this guard still owns. After a stale reclaim
        // the file on disk belongs to the new holder, and deleting it here
        // would open the door to a third writer.
        let still_ours = fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|s| serde_json::from_str::<LockInfo>(&s).ok())
            .map(|c| c.pid == self.info.pid && c.acquired_at == self.info.acquired_at)
            .unwrap_or(false);
        if still_ours {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
