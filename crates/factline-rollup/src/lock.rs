use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::RollupError;

/// Which output directory a lock protects. The file name distinguishes the
/// metrics and events rollups so the two can run concurrently against the
/// same output root without contending on one another's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Metrics,
    Events,
}

impl LockKind {
    fn file_name(self) -> &'static str {
        match self {
            LockKind::Metrics => ".rollup.lock",
            LockKind::Events => ".event_rollup.lock",
        }
    }
}

/// Exclusive, on-disk, single-host writer lock with stale-owner recovery.
///
/// The rollup process may be invoked by an external scheduler on a bare
/// host, so an in-process mutex is not enough: the lock file itself is the
/// gate, and a crashed owner is detected by probing its PID rather than by
/// any cooperative signal.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Acquires the lock for `kind` under `dir`, creating `dir` if needed.
    /// On conflict with a dead owner, removes the stale lock and retries
    /// exactly once; a live owner is reported as [`RollupError::AlreadyRunning`].
    pub fn acquire(dir: &Path, kind: LockKind) -> Result<Self, RollupError> {
        std::fs::create_dir_all(dir).map_err(|source| RollupError::LockIo {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir.join(kind.file_name());

        match Self::try_create(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(source) => {
                return Err(RollupError::LockIo {
                    path: path.display().to_string(),
                    source,
                })
            }
        }

        if let Some(pid) = read_owner_pid(&path) {
            if is_alive(pid) {
                return Err(RollupError::AlreadyRunning {
                    path: path.display().to_string(),
                });
            }
        }

        tracing::warn!(path = %path.display(), "removing lock held by a dead owner");
        let _ = std::fs::remove_file(&path);

        Self::try_create(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                RollupError::AlreadyRunning {
                    path: path.display().to_string(),
                }
            } else {
                RollupError::LockIo {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;

        Ok(Self { path })
    }

    fn try_create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let owner = format!("pid={} started={}", std::process::id(), Utc::now().to_rfc3339());
        file.write_all(owner.as_bytes())?;
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove rollup lock on release");
        }
    }
}

fn read_owner_pid(path: &Path) -> Option<i32> {
    let mut contents = String::new();
    std::fs::File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    contents
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("pid="))
        .and_then(|s| s.parse().ok())
}

#[cfg(unix)]
fn is_alive(pid: i32) -> bool {
    // Signal 0 performs no actual signal delivery, only existence/permission
    // checks, making it a safe liveness probe.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_alive(_pid: i32) -> bool {
    true
}
