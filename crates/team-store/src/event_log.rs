//! Append-only JSONL event log, one file per job.

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use crate::config::StateRootConfig;
use crate::error::StoreResult;
use crate::models::{EventRecord, EventType};

/// Append one event. No lock is taken: concurrent appenders race only over
/// `O_APPEND` write ordering, which the kernel serializes for us, and
/// readers never assume line order reflects global causal order across
/// processes.
pub async fn append(
    config: &StateRootConfig,
    job_id: &str,
    event_type: EventType,
    message: impl Into<String>,
    payload: Option<serde_json::Value>,
) -> StoreResult<EventRecord> {
    let record = EventRecord {
        v: 1,
        id: uuid::Uuid::new_v4().to_string(),
        job_id: job_id.to_string(),
        event_type,
        message: message.into(),
        payload,
        created_at: Utc::now(),
    };

    let path = config.events_path(job_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_vec(&record)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    file.write_all(&line).await?;
    file.flush().await?;

    Ok(record)
}

/// Return up to `limit` most recent events, oldest first.
pub async fn list_recent(
    config: &StateRootConfig,
    job_id: &str,
    limit: usize,
) -> StoreResult<Vec<EventRecord>> {
    let path = config.events_path(job_id);
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut all = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(&line) {
            Ok(record) => all.push(record),
            Err(err) => {
                tracing::warn!(job_id, %err, "skipping malformed event log line");
            }
        }
    }

    if all.len() > limit {
        all.drain(0..all.len() - limit);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        append(&config, "job-1", EventType::Queued, "queued", None).await.unwrap();
        append(&config, "job-1", EventType::TeamCompleted, "done", None).await.unwrap();

        let events = list_recent(&config, "job-1", 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Queued);
        assert_eq!(events[1].event_type, EventType::TeamCompleted);
    }

    #[tokio::test]
    async fn list_recent_truncates_to_limit_keeping_newest() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        for i in 0..5 {
            append(&config, "job-1", EventType::Log, format!("line {i}"), None).await.unwrap();
        }
        let events = list_recent(&config, "job-1", 2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "line 3");
        assert_eq!(events[1].message, "line 4");
    }

    #[tokio::test]
    async fn list_recent_on_missing_log_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let events = list_recent(&config, "no-such-job", 10).await.unwrap();
        assert!(events.is_empty());
    }
}
