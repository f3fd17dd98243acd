//! `team status` command: show job and team-run progress.

use anyhow::Result;

use team_store::config::StateRootConfig;
use team_store::job_store;

pub async fn run_status(state_root: &StateRootConfig, job_id: Option<&str>) -> Result<()> {
    match job_id {
        Some(id) => run_job_status(state_root, id).await,
        None => run_fleet_status(state_root).await,
    }
}

async fn run_job_status(state_root: &StateRootConfig, job_id: &str) -> Result<()> {
    let job = job_store::read(state_root, job_id).await?;

    println!("Job: {}", job.id);
    println!("  provider: {}", job.provider);
    println!("  mode: {}", job.mode);
    println!("  repo: {} @ {}", job.repo, job.git_ref);
    println!("  status: {}", job.status);
    println!("  approval: {}", job.approval_state);
    if let Some(err) = &job.error {
        println!("  error: {err}");
    }

    let Some(state) = &job.options.team_state else {
        println!("  (no team run started yet)");
        return Ok(());
    };

    println!();
    println!("Team run:");
    println!("  phase: {}", state.phase);
    println!("  fixAttempts: {}/{}", state.fix_attempts, state.max_fix_attempts);
    println!(
        "  metrics: queued={} running={} succeeded={} failed={} blocked={} canceled={}",
        state.metrics.queued,
        state.metrics.running,
        state.metrics.succeeded,
        state.metrics.failed,
        state.metrics.blocked,
        state.metrics.canceled,
    );
    println!();
    println!("Tasks:");
    for task in &state.tasks {
        let icon = match task.status {
            team_store::models::TaskStatus::Queued => ".",
            team_store::models::TaskStatus::Running => "*",
            team_store::models::TaskStatus::Succeeded => "+",
            team_store::models::TaskStatus::Failed => "!",
            team_store::models::TaskStatus::Blocked => "o",
            team_store::models::TaskStatus::Canceled => "x",
        };
        println!(
            "  [{icon}] {:<14} {:<10} attempt {} ({})",
            task.id, task.role, task.attempt, task.status
        );
        if let Some(err) = &task.error {
            println!("        error: {err}");
        }
    }

    Ok(())
}

async fn run_fleet_status(state_root: &StateRootConfig) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(&state_root.jobs_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No jobs found.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut job_ids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            job_ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    if job_ids.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    job_ids.sort();

    println!("{:<38} {:<10} {:<18} {:>10}", "ID", "STATUS", "PHASE", "PROGRESS");
    println!("{}", "-".repeat(80));

    for job_id in job_ids {
        let job = match job_store::read(state_root, &job_id).await {
            Ok(job) => job,
            Err(_) => continue,
        };
        let (phase, progress) = match &job.options.team_state {
            Some(state) => {
                let total = state.tasks.len();
                (state.phase.clone(), format!("{}/{}", state.metrics.succeeded, total))
            }
            None => ("-".to_string(), "0/0".to_string()),
        };
        println!("{:<38} {:<10} {:<18} {:>10}", job.id, job.status, phase, progress);
    }

    Ok(())
}
