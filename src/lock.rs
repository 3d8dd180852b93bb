// ABOUTME: Run-level lock that prevents overlapping sync invocations
// ABOUTME: Lock file holds the owner PID; locks left by dead processes are reclaimed

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another sync run is still active (PID {pid}, lock file {}). \
         Skipping this invocation; if PID {pid} is not a retail-sync process, \
         delete the lock file by hand.",
        .path.display()
    )]
    Held { pid: u32, path: PathBuf },

    #[error("failed to manage lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Advisory lock held for the duration of one sync run.
///
/// Acquisition never blocks: if a live process holds the lock the caller
/// gets `LockError::Held` and reports "previous run still active". A lock
/// file whose PID no longer maps to a running process is stale (a crashed
/// run) and is reclaimed.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source: std::io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                match Self::read_owner_pid(path) {
                    Some(pid) if is_process_running(pid) => Err(LockError::Held {
                        pid,
                        path: path.to_path_buf(),
                    }),
                    owner => {
                        match owner {
                            Some(pid) => tracing::warn!(
                                "Reclaiming stale lock file {} (PID {} is gone)",
                                path.display(),
                                pid
                            ),
                            None => tracing::warn!(
                                "Reclaiming unreadable lock file {}",
                                path.display()
                            ),
                        }
                        fs::remove_file(path).map_err(io_err)?;
                        // One more attempt; losing this race means a live
                        // competitor just took the lock.
                        match Self::try_create(path) {
                            Ok(lock) => Ok(lock),
                            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                                let pid = Self::read_owner_pid(path).unwrap_or(0);
                                Err(LockError::Held {
                                    pid,
                                    path: path.to_path_buf(),
                                })
                            }
                            Err(err) => Err(io_err(err)),
                        }
                    }
                }
            }
            Err(err) => Err(io_err(err)),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", std::process::id())?;
        tracing::debug!(
            "Acquired run lock {} (PID {})",
            path.display(),
            std::process::id()
        );
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read_owner_pid(path: &Path) -> Option<u32> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(
                "Failed to remove lock file {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

/// Check if a process with the given PID is running.
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // Send signal 0 to check if process exists
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(windows)]
fn is_process_running(pid: u32) -> bool {
    // OpenProcess with PROCESS_QUERY_LIMITED_INFORMATION
    const PROCESS_QUERY_LIMITED_INFORMATION: u32 = 0x1000;
    const SYNCHRONIZE: u32 = 0x00100000;

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION | SYNCHRONIZE, 0, pid);
        if handle.is_null() {
            return false;
        }

        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);

        // STILL_ACTIVE = 259
        result != 0 && exit_code == 259
    }
}

#[cfg(windows)]
extern "system" {
    fn OpenProcess(
        dwDesiredAccess: u32,
        bInheritHandle: i32,
        dwProcessId: u32,
    ) -> *mut std::ffi::c_void;
    fn GetExitCodeProcess(hProcess: *mut std::ffi::c_void, lpExitCode: *mut u32) -> i32;
    fn CloseHandle(hObject: *mut std::ffi::c_void) -> i32;
}
