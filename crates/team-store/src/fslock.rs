//! Exclusive-create file locking and atomic writes.
//!
//! Every mutation to a job's `record.json` takes the job's `.lock` file
//! first. The lock is a plain `O_EXCL` create: whoever creates it first
//! holds it, everyone else spins. A lock whose mtime is older than
//! [`STALE_AFTER`] is assumed abandoned (its holder crashed or was killed)
//! and is broken by the next waiter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::error::{StoreError, StoreResult};

/// A lock is considered abandoned after this long with no holder cleanup.
pub const STALE_AFTER: Duration = Duration::from_secs(30);
/// Give up waiting for a contended lock after this long.
pub const ACQUIRE_DEADLINE: Duration = Duration::from_secs(5);
/// Poll interval while spinning on a contended lock.
pub const SPIN_INTERVAL: Duration = Duration::from_millis(25);

/// Holds a job's `.lock` file until dropped.
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the lock at `lock_path`, breaking a stale holder if necessary.
///
/// `job_id` is only used for error messages.
pub async fn acquire(lock_path: &Path, job_id: &str) -> StoreResult<LockGuard> {
    acquire_with(lock_path, job_id, STALE_AFTER, ACQUIRE_DEADLINE).await
}

/// [`acquire`] with an injectable staleness threshold and acquire deadline,
/// split out so tests don't have to wait out the real 30s/5s defaults.
pub async fn acquire_with(
    lock_path: &Path,
    job_id: &str,
    stale_after: Duration,
    acquire_deadline: Duration,
) -> StoreResult<LockGuard> {
    if let Some(parent) = lock_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let deadline = tokio::time::Instant::now() + acquire_deadline;
    loop {
        match tokio::fs::OpenOptions::new().write(true).create_new(true).open(lock_path).await {
            Ok(_) => return Ok(LockGuard { path: lock_path.to_path_buf() }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(lock_path, stale_after).await {
                    // Best-effort: if this races another breaker, the next
                    // create_new attempt will simply fail and we keep
                    // spinning.
                    let _ = tokio::fs::remove_file(lock_path).await;
                    continue;
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(StoreError::LockTimeout { job_id: job_id.to_string() });
                }
                tokio::time::sleep(SPIN_INTERVAL).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = tokio::fs::metadata(lock_path).await else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match modified.elapsed() {
        Ok(age) => age > stale_after,
        Err(_) => false,
    }
}

/// Write `bytes` to `path` atomically: write to a sibling temp file, `fsync`,
/// then rename over the destination.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
        uuid::Uuid::new_v4()
    ));
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
