//! `team submit` command: create a job and enqueue it for a worker.

use anyhow::Result;

use team_store::config::StateRootConfig;
use team_store::models::{JobOptions, Mode, NewJob, Provider};
use team_store::{job_store, queue};

#[allow(clippy::too_many_arguments)]
pub async fn run_submit(
    state_root: &StateRootConfig,
    provider: Provider,
    repo: String,
    git_ref: String,
    task: String,
    require_approval: bool,
    parallel_tasks: Option<usize>,
    max_fix_attempts: Option<u32>,
) -> Result<()> {
    let options = JobOptions {
        team_parallel_tasks: parallel_tasks,
        team_max_fix_attempts: max_fix_attempts,
        ..JobOptions::default()
    };

    let job = job_store::create(
        state_root,
        NewJob { provider, mode: Mode::Team, repo, git_ref, task, options, require_approval },
    )
    .await?;
    queue::enqueue(state_root, &job.id).await?;

    println!("Submitted job {}", job.id);
    println!("  provider: {}", job.provider);
    println!("  repo: {}", job.repo);
    println!("  ref: {}", job.git_ref);
    println!("  status: {}", job.status);

    Ok(())
}
