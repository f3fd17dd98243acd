//! Resolution of the on-disk roots the store reads and writes.

use std::path::PathBuf;

/// Resolved filesystem layout for job state and the work queue.
#[derive(Debug, Clone)]
pub struct StateRootConfig {
    /// Root containing one directory per job (`<root>/<job-id>/record.json`).
    pub jobs_root: PathBuf,
    /// Root containing the `pending/` and `processing/` claim directories.
    pub queue_root: PathBuf,
}

impl StateRootConfig {
    /// Resolve from the environment, falling back to `WORK_ROOT`-relative
    /// defaults when `OMX_STATE_ROOT` is unset.
    pub fn from_env() -> Self {
        if let Ok(root) = std::env::var("OMX_STATE_ROOT") {
            let root = PathBuf::from(root);
            return Self { jobs_root: root.join("jobs"), queue_root: root.join("queue") };
        }

        let work_root = std::env::var("WORK_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".omx"));
        let state_root = work_root.join("state");
        Self { jobs_root: state_root.join("jobs"), queue_root: state_root.join("queue") }
    }

    /// Build a config rooted at an arbitrary directory, primarily for tests.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self { jobs_root: root.join("jobs"), queue_root: root.join("queue") }
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_root.join(job_id)
    }

    pub fn record_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("record.json")
    }

    pub fn lock_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(".lock")
    }

    pub fn events_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("events.jsonl")
    }

    pub fn queue_pending_dir(&self) -> PathBuf {
        self.queue_root.join("pending")
    }

    pub fn queue_processing_dir(&self) -> PathBuf {
        self.queue_root.join("processing")
    }
}

impl Default for StateRootConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_derives_jobs_and_queue_under_root() {
        let cfg = StateRootConfig::at("/tmp/example");
        assert_eq!(cfg.jobs_root, PathBuf::from("/tmp/example/jobs"));
        assert_eq!(cfg.queue_root, PathBuf::from("/tmp/example/queue"));
        assert_eq!(cfg.record_path("job-1"), PathBuf::from("/tmp/example/jobs/job-1/record.json"));
        assert_eq!(cfg.lock_path("job-1"), PathBuf::from("/tmp/example/jobs/job-1/.lock"));
        assert_eq!(cfg.events_path("job-1"), PathBuf::from("/tmp/example/jobs/job-1/events.jsonl"));
        assert_eq!(cfg.queue_pending_dir(), PathBuf::from("/tmp/example/queue/pending"));
        assert_eq!(cfg.queue_processing_dir(), PathBuf::from("/tmp/example/queue/processing"));
    }

    #[test]
    fn from_env_prefers_omx_state_root() {
        // SAFETY: test-only, serialized by the default single-threaded test
        // harness behavior for this crate; no other test touches these vars.
        unsafe {
            std::env::set_var("OMX_STATE_ROOT", "/tmp/omx-root");
            std::env::remove_var("WORK_ROOT");
        }
        let cfg = StateRootConfig::from_env();
        assert_eq!(cfg.jobs_root, PathBuf::from("/tmp/omx-root/jobs"));
        unsafe {
            std::env::remove_var("OMX_STATE_ROOT");
        }
    }
}
