//! Shared fixtures for team-store/team-core/team-cli integration tests.
//!
//! There is no database and no container to spin up: every fixture here is
//! either a temp directory or a plain in-memory value, since the whole
//! system's durable state is the filesystem under a state root.

use std::ops::Deref;

use team_store::config::StateRootConfig;
use team_store::models::{JobOptions, JobRecord, Mode, NewJob, Provider, TeamTask};
use team_store::{job_store, queue};

/// A state root rooted at a fresh temp directory, kept alive for the
/// duration of the test. Derefs to [`StateRootConfig`] for convenience.
pub struct TempStateRoot {
    _dir: tempfile::TempDir,
    pub config: StateRootConfig,
}

impl Deref for TempStateRoot {
    type Target = StateRootConfig;

    fn deref(&self) -> &Self::Target {
        &self.config
    }
}

/// Build a fresh temp-directory-backed state root.
pub fn temp_state_root() -> TempStateRoot {
    let dir = tempfile::tempdir().expect("create temp dir for state root");
    let config = StateRootConfig::at(dir.path());
    TempStateRoot { _dir: dir, config }
}

/// A minimal `{provider:claude, mode:team, repo:"org/repo", ref:"main"}`
/// job input, for tests that only care about `task` and `options`.
pub fn sample_new_job(task: impl Into<String>) -> NewJob {
    NewJob {
        provider: Provider::Claude,
        mode: Mode::Team,
        repo: "org/repo".to_string(),
        git_ref: "main".to_string(),
        task: task.into(),
        options: JobOptions::default(),
        require_approval: false,
    }
}

/// [`sample_new_job`] with `options` overridden by the caller.
pub fn sample_new_job_with_options(task: impl Into<String>, options: JobOptions) -> NewJob {
    NewJob { options, ..sample_new_job(task) }
}

/// Create and enqueue a sample job against `state_root`, returning the
/// created record.
pub async fn submit_sample_job(state_root: &StateRootConfig, task: impl Into<String>) -> JobRecord {
    let job = job_store::create(state_root, sample_new_job(task)).await.expect("create sample job");
    queue::enqueue(state_root, &job.id).await.expect("enqueue sample job");
    job
}

/// The built-in six-role serial plan (`planner -> researcher -> designer ->
/// developer -> executor -> verifier`) used as the default team-run plan
/// for a job submitted without an explicit `team.teamTasks` template.
pub fn six_task_plan(task_text: &str) -> Vec<TeamTask> {
    team_core::plan::build_default_plan(task_text)
}
