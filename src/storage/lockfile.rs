//! Process Lock File Module
//!
//! Prevents two engines from sharing one data directory (sled allows a
//! single opener) and lets `health-sentinel stop` find the running engine.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Process lock file manager
///
/// Creates a lock file with the current process ID. Removed on drop.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    /// Lock file name
    pub const LOCK_FILE_NAME: &'static str = ".health-sentinel.lock";

    /// Acquire a process lock for the given data directory
    ///
    /// Returns an error if another instance is already running.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::check_existing_lock(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "Another health-sentinel engine is already running (PID: {})\n\
                         \n\
                         To resolve this:\n\
                         1. Stop it with `health-sentinel stop`, or\n\
                         2. If no other engine is running, remove the stale lock file:\n\
                            rm {:?}",
                        pid,
                        lock_path
                    );
                }
                Ok(None) => {
                    tracing::info!("Removing stale lock file from previous instance");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!("Error checking existing lock: {}", e);
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let mut file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file: {:?}", lock_path))?;
        writeln!(file, "{}", pid).context("Failed to write PID to lock file")?;

        tracing::debug!("Acquired process lock (PID: {}) at {:?}", pid, lock_path);

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// PID of the engine holding the lock in `data_dir`, if one is running.
    pub fn running_pid<P: AsRef<Path>>(data_dir: P) -> Result<Option<u32>> {
        let lock_path = data_dir.as_ref().join(Self::LOCK_FILE_NAME);
        if !lock_path.exists() {
            return Ok(None);
        }
        Self::check_existing_lock(&lock_path)
    }

    /// Ask the engine holding the lock to shut down (SIGTERM).
    ///
    /// Returns the signalled PID, or `None` when nothing is running.
    #[cfg(unix)]
    pub fn signal_running<P: AsRef<Path>>(data_dir: P) -> Result<Option<u32>> {
        let Some(pid) = Self::running_pid(data_dir)? else {
            return Ok(None);
        };
        let raw = libc::pid_t::try_from(pid).context("PID out of range")?;
        // SAFETY: kill(2) with a valid signal number has no memory-safety preconditions
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc != 0 {
            bail!(
                "Failed to signal PID {}: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
        Ok(Some(pid))
    }

    #[cfg(not(unix))]
    pub fn signal_running<P: AsRef<Path>>(_data_dir: P) -> Result<Option<u32>> {
        bail!("Stopping a running engine is only supported on Unix")
    }

    /// Check if an existing lock file is held by a running process
    ///
    /// Returns:
    /// - `Ok(Some(pid))` if the lock is held by a running process
    /// - `Ok(None)` if the lock file exists but the process is not running (stale)
    /// - `Err(_)` if there was an error reading/parsing the lock file
    fn check_existing_lock(lock_path: &Path) -> Result<Option<u32>> {
        let contents =
            fs::read_to_string(lock_path).context("Failed to read lock file contents")?;
        let pid: u32 = contents
            .trim()
            .parse()
            .context("Failed to parse PID from lock file")?;

        if pid != std::process::id() && Self::is_process_running(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    /// Check if a process with the given PID is a live health-sentinel engine
    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        let proc_path = format!("/proc/{}/cmdline", pid);
        if let Ok(cmdline) = fs::read_to_string(&proc_path) {
            cmdline.contains("health-sentinel") || cmdline.contains("health_sentinel")
        } else {
            false
        }
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    /// Release the lock (called automatically on drop)
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!("Failed to remove lock file: {}", e);
            } else {
                tracing::debug!("Released process lock at {:?}", self.lock_path);
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_lock_writes_pid() {
        let temp_dir = tempdir().unwrap();
        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
        assert!(lock.path().exists());

        let contents = fs::read_to_string(lock.path()).unwrap();
        let pid: u32 = contents.trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = tempdir().unwrap();
        let lock_path;
        {
            let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
            lock_path = lock.path().to_path_buf();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_stale_lock_removed() {
        let temp_dir = tempdir().unwrap();
        let lock_path = temp_dir.path().join(ProcessLock::LOCK_FILE_NAME);
        fs::write(&lock_path, "999999999\n").unwrap();

        assert_eq!(ProcessLock::running_pid(temp_dir.path()).unwrap(), None);
        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_nothing_running_without_lock() {
        let temp_dir = tempdir().unwrap();
        assert_eq!(ProcessLock::running_pid(temp_dir.path()).unwrap(), None);
    }
}
