//! Best-effort file-based liveness markers
//!
//! Two usage modes share the same primitive: a filesystem sentinel whose
//! write failures are caught, logged, and swallowed. The markers are
//! advisory; an external stall detector consumes them.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// Validity window for the auto-swap lock.
const SWAP_LOCK_VALIDITY: Duration = Duration::from_secs(2 * 60);
/// Interval between heartbeat rewrites.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Upper bound on tracked-operation timeouts.
const MAX_PENDING_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Empty sentinel marking an auto-swap in progress.
///
/// There is no explicit clear step: staleness alone deactivates the lock,
/// and downstream consumers depend on that window.
pub struct SwapLock {
    path: PathBuf,
    validity: Duration,
}

impl SwapLock {
    /// Create a lock handle over the given sentinel path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            validity: SWAP_LOCK_VALIDITY,
        }
    }

    #[cfg(test)]
    fn with_validity(path: impl Into<PathBuf>, validity: Duration) -> Self {
        Self {
            path: path.into(),
            validity,
        }
    }

    /// Write the sentinel. Failures are logged and swallowed.
    pub fn write(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, []) {
            warn!(path = %self.path.display(), error = %e, "failed to write swap lock");
        }
    }

    /// The lock is active while its last write is within the validity
    /// window; the boundary is inclusive. Read failures count as inactive.
    pub fn is_active(&self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        match modified.elapsed() {
            Ok(age) => age <= self.validity,
            // A last-write time in the future counts as fresh.
            Err(_) => true,
        }
    }
}

/// Heartbeat marker for a long-running pending operation.
///
/// While the tracked task runs, the marker is rewritten with the operation's
/// start timestamp every 10 seconds. Clean completion deletes the marker; a
/// timeout leaves the stale marker in place for the stall detector.
pub struct PendingOperationTracker {
    path: PathBuf,
    enabled: bool,
    interval: Duration,
}

impl PendingOperationTracker {
    /// Create a tracker over the given marker path.
    ///
    /// Outside the managed hosting environment (`enabled == false`) tracking
    /// is a no-op passthrough.
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            interval: HEARTBEAT_INTERVAL,
        }
    }

    /// Run `task` while maintaining the heartbeat marker.
    ///
    /// Returns `Some(value)` if the task completed before the timeout, in
    /// which case the marker is removed. Returns `None` if the timeout
    /// elapsed first; the stale marker is intentionally left behind. The
    /// timeout is capped at 30 minutes when unset or over-long.
    pub async fn track<F, T>(&self, task: F, timeout: Option<Duration>) -> Option<T>
    where
        F: Future<Output = T>,
    {
        if !self.enabled {
            return Some(task.await);
        }

        let timeout = timeout
            .filter(|t| *t <= MAX_PENDING_TIMEOUT)
            .unwrap_or(MAX_PENDING_TIMEOUT);
        let started = Utc::now();
        self.write_marker(&started);

        let deadline = Instant::now() + timeout;
        tokio::pin!(task);
        loop {
            // Clamp the tick so the deadline is honored even when it is
            // shorter than the heartbeat interval. The losing delay is
            // dropped by the select, so no idle timer leaks.
            let remaining = deadline.saturating_duration_since(Instant::now());
            let tick = time::sleep(self.interval.min(remaining));
            tokio::select! {
                value = &mut task => {
                    self.remove_marker();
                    return Some(value);
                }
                _ = tick => {
                    if Instant::now() >= deadline {
                        debug!(path = %self.path.display(),
                            "pending operation exceeded its timeout, leaving marker for stall detection");
                        return None;
                    }
                    self.write_marker(&started);
                }
            }
        }
    }

    fn write_marker(&self, started: &DateTime<Utc>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, started.to_rfc3339()) {
            warn!(path = %self.path.display(), error = %e, "failed to write pending-operation marker");
        }
    }

    fn remove_marker(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove pending-operation marker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_active_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SwapLock::new(dir.path().join("autoswap.lock"));
        assert!(!lock.is_active());
        lock.write();
        assert!(lock.is_active());
    }

    #[test]
    fn test_lock_deactivates_on_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SwapLock::with_validity(
            dir.path().join("autoswap.lock"),
            Duration::from_millis(10),
        );
        lock.write();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!lock.is_active());
    }

    #[test]
    fn test_lock_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SwapLock::new(dir.path().join("locks/autoswap.lock"));
        lock.write();
        assert!(lock.is_active());
    }

    #[tokio::test]
    async fn test_completed_task_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.marker");
        let tracker = PendingOperationTracker::new(&path, true);

        let value = tracker.track(async { 42 }, Some(Duration::from_secs(5))).await;
        assert_eq!(value, Some(42));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_timed_out_task_leaves_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.marker");
        let tracker = PendingOperationTracker::new(&path, true);

        let value = tracker
            .track(futures::future::pending::<()>(), Some(Duration::from_millis(50)))
            .await;
        assert_eq!(value, None);
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&contents).is_ok());
    }

    #[tokio::test]
    async fn test_tracking_outside_managed_environment_is_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.marker");
        let tracker = PendingOperationTracker::new(&path, false);

        let value = tracker.track(async { "done" }, None).await;
        assert_eq!(value, Some("done"));
        assert!(!path.exists());
    }
}
