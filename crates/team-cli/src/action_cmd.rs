//! `team approve|reject|cancel|resume` commands: the action interface that
//! drives a job between `waiting_approval`/terminal states and `queued`.

use anyhow::{Result, bail};
use chrono::Utc;

use team_core::scheduler;
use team_store::config::StateRootConfig;
use team_store::models::{ApprovalState, EventType, JobStatus, TaskStatus};
use team_store::{event_log, job_store, queue};

/// Approve the task that requested approval: clears its `requiresApproval`
/// flag, re-derives its readiness, and resumes the run.
pub async fn run_approve(state_root: &StateRootConfig, job_id: &str) -> Result<()> {
    let job = job_store::read(state_root, job_id).await?;
    if job.approval_state != ApprovalState::Required {
        bail!("job {job_id} is not waiting for approval (approvalState={})", job.approval_state);
    }

    job_store::update(state_root, job_id, |r| {
        r.status = JobStatus::Queued;
        r.approval_state = ApprovalState::Approved;
        r.error = None;
        if let Some(state) = &mut r.options.team_state {
            state.status = JobStatus::Queued;
            if let Some(task_id) = state.approval_task_id.take() {
                let snapshot = state.tasks.clone();
                if let Some(task) = state.task_mut(&task_id) {
                    task.requires_approval = false;
                    task.error = None;
                    task.status = if scheduler::deps_satisfied(task, &snapshot) {
                        TaskStatus::Queued
                    } else {
                        TaskStatus::Blocked
                    };
                }
            }
        }
    })
    .await?;
    queue::enqueue(state_root, job_id).await?;
    event_log::append(state_root, job_id, EventType::Approval, "approved by operator".to_string(), None).await?;

    println!("Job {job_id} approved and re-queued.");
    Ok(())
}

/// Reject the task that requested approval: the job fails terminally; the
/// team run's last snapshot (still `waiting_approval`) is left untouched.
pub async fn run_reject(state_root: &StateRootConfig, job_id: &str) -> Result<()> {
    let job = job_store::read(state_root, job_id).await?;
    if job.approval_state != ApprovalState::Required {
        bail!("job {job_id} is not waiting for approval (approvalState={})", job.approval_state);
    }

    job_store::update(state_root, job_id, |r| {
        r.status = JobStatus::Failed;
        r.approval_state = ApprovalState::Rejected;
        r.error = Some("Rejected by approver".to_string());
        r.finished_at = Some(Utc::now());
    })
    .await?;
    event_log::append(state_root, job_id, EventType::Approval, "rejected by operator".to_string(), None).await?;

    println!("Job {job_id} rejected.");
    Ok(())
}

/// Cancel a non-terminal job. The engine loop polls job status each
/// iteration and exits cleanly without patching any still-running task.
pub async fn run_cancel(state_root: &StateRootConfig, job_id: &str) -> Result<()> {
    let job = job_store::read(state_root, job_id).await?;
    if job.status.is_terminal() {
        bail!("job {job_id} is already terminal ({})", job.status);
    }

    job_store::update(state_root, job_id, |r| {
        r.status = JobStatus::Canceled;
        r.finished_at = Some(Utc::now());
        if let Some(state) = &mut r.options.team_state {
            state.status = JobStatus::Canceled;
        }
    })
    .await?;
    event_log::append(state_root, job_id, EventType::Canceled, "canceled by operator".to_string(), None).await?;

    println!("Job {job_id} canceled.");
    Ok(())
}

/// Resume a terminal job from its preserved options, re-queuing it for a
/// worker to pick back up.
pub async fn run_resume(state_root: &StateRootConfig, job_id: &str) -> Result<()> {
    let job = job_store::read(state_root, job_id).await?;
    if !job.status.is_terminal() {
        bail!("job {job_id} is not terminal ({}); only a finished job can be resumed", job.status);
    }

    job_store::update(state_root, job_id, |r| {
        r.status = JobStatus::Queued;
        r.finished_at = None;
        r.error = None;
        if let Some(state) = &mut r.options.team_state {
            state.status = JobStatus::Queued;
        }
    })
    .await?;
    queue::enqueue(state_root, job_id).await?;
    event_log::append(state_root, job_id, EventType::Queued, "resumed by operator".to_string(), None).await?;

    println!("Job {job_id} resumed and re-queued.");
    Ok(())
}
