//! File-based FIFO work queue.
//!
//! A queued job is one empty-ish file per entry under `pending/`, named so
//! lexical sort order is creation order. Claiming a job is a single
//! `rename()` from `pending/` into `processing/`; the filesystem's rename
//! semantics make that the one atomic serialization point two workers can
//! race on, so at most one of them ever sees `Ok(())`. A claimed entry's
//! mtime in `processing/` is the lease: [`reap_stale`] moves anything older
//! than the caller's threshold back to `pending/` for someone else to pick
//! up.

use chrono::Utc;

use crate::config::StateRootConfig;
use crate::error::StoreResult;

/// A queue entry that was just claimed.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: String,
    /// Filename under `processing/`, needed to release or requeue later.
    pub queue_entry: String,
}

/// Enqueue a job for pickup by any worker. A no-op if the job already has
/// an entry in `pending/` or `processing/` — enqueuing the same id twice is
/// equivalent to enqueuing it once.
pub async fn enqueue(config: &StateRootConfig, job_id: &str) -> StoreResult<()> {
    let pending_dir = config.queue_pending_dir();
    let processing_dir = config.queue_processing_dir();
    tokio::fs::create_dir_all(&pending_dir).await?;
    tokio::fs::create_dir_all(&processing_dir).await?;

    if has_entry_for(&pending_dir, job_id).await? || has_entry_for(&processing_dir, job_id).await? {
        return Ok(());
    }

    let filename = entry_filename(job_id);
    let path = pending_dir.join(filename);
    tokio::fs::write(&path, job_id.as_bytes()).await?;
    Ok(())
}

async fn has_entry_for(dir: &std::path::Path, job_id: &str) -> StoreResult<bool> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if job_id_from_entry(&name) == job_id {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Claim the oldest pending job, if any.
pub async fn claim(config: &StateRootConfig) -> StoreResult<Option<ClaimedJob>> {
    let pending_dir = config.queue_pending_dir();
    let processing_dir = config.queue_processing_dir();
    tokio::fs::create_dir_all(&pending_dir).await?;
    tokio::fs::create_dir_all(&processing_dir).await?;

    let mut names = sorted_entries(&pending_dir).await?;
    names.sort();

    for name in names {
        let from = pending_dir.join(&name);
        let to = processing_dir.join(&name);
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => {
                let job_id = job_id_from_entry(&name);
                return Ok(Some(ClaimedJob { job_id, queue_entry: name }));
            }
            // Another worker won the race for this exact entry; try the
            // next-oldest one instead of giving up.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Release a claimed entry once its job has reached a terminal state.
pub async fn release(config: &StateRootConfig, queue_entry: &str) -> StoreResult<()> {
    let path = config.queue_processing_dir().join(queue_entry);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Move every `processing/` entry older than `stale_after` back to
/// `pending/` under a fresh (later) name, returning the reclaimed job ids.
pub async fn reap_stale(
    config: &StateRootConfig,
    stale_after: std::time::Duration,
) -> StoreResult<Vec<String>> {
    let processing_dir = config.queue_processing_dir();
    let pending_dir = config.queue_pending_dir();
    tokio::fs::create_dir_all(&processing_dir).await?;
    tokio::fs::create_dir_all(&pending_dir).await?;

    let mut reaped = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&processing_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let meta = entry.metadata().await?;
        let Ok(modified) = meta.modified() else { continue };
        let Ok(age) = modified.elapsed() else { continue };
        if age <= stale_after {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let job_id = job_id_from_entry(&name);
        let from = entry.path();
        let to = pending_dir.join(entry_filename(&job_id));
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => reaped.push(job_id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(reaped)
}

fn entry_filename(job_id: &str) -> String {
    let ts = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    format!("{ts:020}-{job_id}")
}

fn job_id_from_entry(entry: &str) -> String {
    entry.split_once('-').map(|(_, id)| id.to_string()).unwrap_or_else(|| entry.to_string())
}

async fn sorted_entries(dir: &std::path::Path) -> StoreResult<Vec<String>> {
    let mut out = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_file() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_claim_returns_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        enqueue(&config, "job-a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        enqueue(&config, "job-b").await.unwrap();

        let first = claim(&config).await.unwrap().unwrap();
        assert_eq!(first.job_id, "job-a");
        let second = claim(&config).await.unwrap().unwrap();
        assert_eq!(second.job_id, "job-b");
        assert!(claim(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_removes_processing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        enqueue(&config, "job-a").await.unwrap();
        let claimed = claim(&config).await.unwrap().unwrap();
        release(&config, &claimed.queue_entry).await.unwrap();
        let mut read_dir = tokio::fs::read_dir(config.queue_processing_dir()).await.unwrap();
        assert!(read_dir.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reap_stale_moves_old_claims_back_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        enqueue(&config, "job-a").await.unwrap();
        let claimed = claim(&config).await.unwrap().unwrap();
        assert!(claim(&config).await.unwrap().is_none());

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let reaped = reap_stale(&config, std::time::Duration::from_millis(10)).await.unwrap();
        assert_eq!(reaped, vec!["job-a".to_string()]);
        drop(claimed);

        let reclaimed = claim(&config).await.unwrap().unwrap();
        assert_eq!(reclaimed.job_id, "job-a");
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_while_pending_or_processing() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        enqueue(&config, "job-a").await.unwrap();
        enqueue(&config, "job-a").await.unwrap();
        let mut pending = tokio::fs::read_dir(config.queue_pending_dir()).await.unwrap();
        let mut count = 0;
        while pending.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);

        let claimed = claim(&config).await.unwrap().unwrap();
        enqueue(&config, "job-a").await.unwrap();
        let mut pending = tokio::fs::read_dir(config.queue_pending_dir()).await.unwrap();
        assert!(pending.next_entry().await.unwrap().is_none());
        release(&config, &claimed.queue_entry).await.unwrap();
    }

    #[tokio::test]
    async fn reap_stale_leaves_fresh_claims_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        enqueue(&config, "job-a").await.unwrap();
        claim(&config).await.unwrap().unwrap();
        let reaped = reap_stale(&config, std::time::Duration::from_secs(30)).await.unwrap();
        assert!(reaped.is_empty());
    }
}
