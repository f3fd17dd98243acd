//! CRUD over a job's `record.json`, guarded by its `.lock` file.

use chrono::Utc;

use crate::config::StateRootConfig;
use crate::error::{StoreError, StoreResult};
use crate::fslock;
use crate::models::{ApprovalState, JobRecord, JobStatus, NewJob};

/// Create a new job record and write it to disk.
pub async fn create(config: &StateRootConfig, new_job: NewJob) -> StoreResult<JobRecord> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let approval_state =
        if new_job.require_approval { ApprovalState::Required } else { ApprovalState::None };

    let repo = if new_job.repo.trim().is_empty() { "unknown".to_string() } else { new_job.repo };
    let git_ref = if new_job.git_ref.trim().is_empty() { "main".to_string() } else { new_job.git_ref };

    let record = JobRecord {
        id: id.clone(),
        provider: new_job.provider,
        mode: new_job.mode,
        repo,
        git_ref,
        task: new_job.task,
        options: new_job.options,
        status: JobStatus::Queued,
        approval_state,
        created_at: now,
        updated_at: now,
        started_at: None,
        finished_at: None,
        error: None,
        output: None,
    };

    let lock_path = config.lock_path(&id);
    let _guard = fslock::acquire(&lock_path, &id).await?;
    write_record(config, &record).await?;
    Ok(record)
}

/// Read a job record.
///
/// A record whose JSON fails schema sanity is coerced rather than rejected:
/// an unrecognized `status` becomes `queued`, an unrecognized
/// `approvalState` becomes `none`. A top-level value that isn't even a JSON
/// object is treated the same as a missing file.
pub async fn read(config: &StateRootConfig, job_id: &str) -> StoreResult<JobRecord> {
    let path = config.record_path(job_id);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound { job_id: job_id.to_string() }
        } else {
            StoreError::Io(e)
        }
    })?;

    let mut value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let Some(obj) = value.as_object_mut() else {
        return Err(StoreError::NotFound { job_id: job_id.to_string() });
    };
    coerce_enum_field(obj, "status", "queued");
    coerce_enum_field(obj, "approvalState", "none");

    serde_json::from_value(value).map_err(StoreError::Serde)
}

/// Replace `field` with `fallback` if it doesn't parse as the expected
/// closed-vocabulary string (missing, wrong type, or simply an unknown
/// value are all treated the same way: fall back).
fn coerce_enum_field(obj: &mut serde_json::Map<String, serde_json::Value>, field: &str, fallback: &str) {
    let valid = match field {
        "status" => obj.get(field).and_then(|v| v.as_str()).map(|s| s.parse::<JobStatus>().is_ok()),
        "approvalState" => {
            obj.get(field).and_then(|v| v.as_str()).map(|s| s.parse::<crate::models::ApprovalState>().is_ok())
        }
        _ => None,
    };
    if valid != Some(true) {
        obj.insert(field.to_string(), serde_json::Value::String(fallback.to_string()));
    }
}

/// Read-modify-write a job record under its lock. `f` may mutate the record
/// in place; `updated_at` is refreshed automatically after `f` runs.
pub async fn update<F>(config: &StateRootConfig, job_id: &str, f: F) -> StoreResult<JobRecord>
where
    F: FnOnce(&mut JobRecord),
{
    let lock_path = config.lock_path(job_id);
    let _guard = fslock::acquire(&lock_path, job_id).await?;

    let mut record = read(config, job_id).await?;
    f(&mut record);
    record.updated_at = Utc::now();
    write_record(config, &record).await?;
    Ok(record)
}

async fn write_record(config: &StateRootConfig, record: &JobRecord) -> StoreResult<()> {
    let path = config.record_path(&record.id);
    let bytes = serde_json::to_vec_pretty(record)?;
    fslock::atomic_write(&path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobOptions, Mode, Provider};

    fn new_job() -> NewJob {
        NewJob {
            provider: Provider::Claude,
            mode: Mode::Team,
            repo: "git@example.com:org/repo.git".to_string(),
            git_ref: "main".to_string(),
            task: "ship the thing".to_string(),
            options: JobOptions::default(),
            require_approval: false,
        }
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let created = create(&config, new_job()).await.unwrap();
        let read_back = read(&config, &created.id).await.unwrap();
        assert_eq!(read_back.id, created.id);
        assert_eq!(read_back.status, JobStatus::Queued);
        assert_eq!(read_back.repo, "git@example.com:org/repo.git");
    }

    #[tokio::test]
    async fn create_with_require_approval_sets_required_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let mut job = new_job();
        job.require_approval = true;
        let created = create(&config, job).await.unwrap();
        assert_eq!(created.approval_state, ApprovalState::Required);
    }

    #[tokio::test]
    async fn update_mutates_and_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let created = create(&config, new_job()).await.unwrap();
        let before = created.updated_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = update(&config, &created.id, |r| r.status = JobStatus::Running).await.unwrap();
        assert_eq!(updated.status, JobStatus::Running);
        assert!(updated.updated_at >= before);
    }

    #[tokio::test]
    async fn read_missing_job_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let err = read(&config, "does-not-exist").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn blank_repo_and_ref_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let mut job = new_job();
        job.repo = "  ".to_string();
        job.git_ref = "".to_string();
        let created = create(&config, job).await.unwrap();
        assert_eq!(created.repo, "unknown");
        assert_eq!(created.git_ref, "main");
    }

    #[tokio::test]
    async fn read_coerces_unknown_status_and_approval_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let created = create(&config, new_job()).await.unwrap();
        let path = config.record_path(&created.id);
        let mut value: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        value["status"] = serde_json::Value::String("exploding".to_string());
        value["approvalState"] = serde_json::Value::String("whatever".to_string());
        tokio::fs::write(&path, serde_json::to_vec(&value).unwrap()).await.unwrap();

        let coerced = read(&config, &created.id).await.unwrap();
        assert_eq!(coerced.status, JobStatus::Queued);
        assert_eq!(coerced.approval_state, ApprovalState::None);
    }

    #[tokio::test]
    async fn read_non_object_top_level_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateRootConfig::at(dir.path());
        let path = config.record_path("weird-job");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"[1,2,3]").await.unwrap();
        let err = read(&config, "weird-job").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
