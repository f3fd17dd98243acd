//! The team engine loop: drives one job's team run from its current state
//! to a terminal status or an approval pause, one iteration at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use team_store::config::StateRootConfig;
use team_store::models::{ApprovalState, EventType, JobRecord, JobStatus, MailboxKind, TaskStatus, TeamState};
use team_store::{event_log, job_store};

use crate::claim;
use crate::config::{EngineConfig, IdleBackoffConfig};
use crate::error::{EngineError, EngineResult};
use crate::executor::{self, ExecutionOutcome};
use crate::mailbox;
use crate::scheduler;

/// Outcome of running the engine loop to its next stopping point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Succeeded,
    Failed,
    Canceled,
    WaitingApproval,
}

/// Run the team engine loop for `job_id` until it reaches a terminal state
/// or pauses for approval.
pub async fn run(
    state_root: &StateRootConfig,
    job_id: &str,
    worker_id: &str,
    config: &EngineConfig,
    cancel: CancellationToken,
) -> EngineResult<EngineOutcome> {
    let mut idle_iterations: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(EngineOutcome::Canceled);
        }

        let job = job_store::read(state_root, job_id).await?;
        if job.status == JobStatus::Canceled {
            return Ok(EngineOutcome::Canceled);
        }
        if job.status.is_terminal() {
            return Ok(terminal_outcome(job.status));
        }

        let mut state = extract_team_state(&job);
        let now = Utc::now();

        let reclaimed = claim::reclaim_expired(&mut state, &config.claim, now);
        for reclaimed_task in &reclaimed {
            let event_type =
                if reclaimed_task.non_reporting { EventType::TeamTaskNonReporting } else { EventType::TeamClaimRecovered };
            event_log::append(
                state_root,
                job_id,
                event_type,
                format!("task {} reclaimed from a dead or stalled worker", reclaimed_task.task_id),
                Some(serde_json::json!({"taskId": reclaimed_task.task_id})),
            )
            .await?;
        }

        claim::refresh_own_claims(&mut state, &config.claim, worker_id, now);

        for effect in mailbox::deliver(&mut state, now) {
            match effect {
                mailbox::DeliveryEffect::Reassigned { task_id } => {
                    event_log::append(
                        state_root,
                        job_id,
                        EventType::TeamTaskReassigned,
                        format!("task {task_id} reassigned by mailbox instruction"),
                        Some(serde_json::json!({"taskId": task_id})),
                    )
                    .await?;
                }
                mailbox::DeliveryEffect::ReassignNoMatch => {}
                mailbox::DeliveryEffect::Handled(kind) => {
                    let event_type = match kind {
                        MailboxKind::Question => EventType::TeamMailboxQuestion,
                        MailboxKind::Instruction => EventType::TeamMailboxInstruction,
                        MailboxKind::Notice => EventType::TeamMailboxNotice,
                        MailboxKind::Reassign => continue,
                    };
                    event_log::append(state_root, job_id, event_type, "mailbox message delivered".to_string(), None)
                        .await?;
                }
            }
        }

        state.metrics = team_store::models::TeamMetrics::recompute(&state.tasks);
        state.phase = scheduler::phase(&state.tasks);

        let runnable = scheduler::select_runnable(&state);

        if runnable.is_empty() {
            match handle_idle_iteration(state_root, job_id, &mut state, config, now, &mut idle_iterations).await? {
                Some(outcome) => return Ok(outcome),
                None => continue,
            }
        }

        idle_iterations = 0;
        scheduler::start_batch(&mut state, &config.claim, worker_id, &runnable, now);
        state.phase = scheduler::phase(&state.tasks);
        persist_state(state_root, job_id, &state).await?;

        let results = run_batch(state_root, job_id, &job, &state, &runnable, config).await;

        let mut approval_task_id = None;
        for (task_id, outcome) in results {
            match outcome {
                ExecutionOutcome::Succeeded { patch, mailbox, new_tasks } => {
                    state.mailbox.extend(mailbox);
                    for new_task in new_tasks {
                        if state.task(&new_task.id).is_none() {
                            state.tasks.push(new_task);
                        }
                    }
                    scheduler::apply_task_patch(&mut state, &task_id, patch);
                }
                ExecutionOutcome::ApprovalRequested { patch, mailbox } => {
                    state.mailbox.extend(mailbox);
                    scheduler::apply_task_patch(&mut state, &task_id, patch);
                    approval_task_id = Some(task_id);
                }
                ExecutionOutcome::Failed { patch } => {
                    scheduler::apply_task_patch(&mut state, &task_id, patch);
                }
            }
        }

        state.metrics = team_store::models::TeamMetrics::recompute(&state.tasks);
        state.phase = scheduler::phase(&state.tasks);

        if let Some(task_id) = approval_task_id {
            state.status = JobStatus::WaitingApproval;
            state.approval_task_id = Some(task_id.clone());
            persist_state(state_root, job_id, &state).await?;
            job_store::update(state_root, job_id, |r| {
                r.status = JobStatus::WaitingApproval;
                r.approval_state = ApprovalState::Required;
                r.error = Some(format!("task {task_id} requested approval"));
            })
            .await?;
            event_log::append(
                state_root,
                job_id,
                EventType::TeamWaitingApproval,
                format!("team run paused: task {task_id} is waiting for approval"),
                None,
            )
            .await?;
            return Ok(EngineOutcome::WaitingApproval);
        }

        persist_state(state_root, job_id, &state).await?;
    }
}

/// Run one batch of tasks concurrently, bounded by
/// [`crate::config::ExecutorConfig::worker_concurrency`].
async fn run_batch(
    state_root: &StateRootConfig,
    job_id: &str,
    job: &JobRecord,
    state: &TeamState,
    runnable: &[String],
    config: &EngineConfig,
) -> Vec<(String, ExecutionOutcome)> {
    let semaphore = Arc::new(Semaphore::new(config.executor.worker_concurrency.max(1)));
    let (tx, mut rx) = tokio::sync::mpsc::channel(runnable.len().max(1));
    let workdir = std::path::PathBuf::from(format!("/tmp/omx-work/{job_id}"));
    let _ = tokio::fs::create_dir_all(&workdir).await;

    for task_id in runnable {
        let Some(task) = state.task(task_id).cloned() else { continue };
        let all_tasks = state.tasks.clone();
        let phase = state.phase.clone();
        let options = job.options.clone();
        let job_clone = job.clone();
        let sem = Arc::clone(&semaphore);
        let executor_config = config.executor.clone();
        let wd = workdir.clone();
        let state_root = state_root.clone();
        let job_id = job_id.to_string();
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire_owned().await;
            let outcome = executor::execute_task(
                &state_root,
                &job_id,
                &job_clone,
                &options,
                &task,
                &all_tasks,
                &phase,
                &wd,
                &executor_config,
            )
            .await;
            let _ = tx.send((task.id.clone(), outcome)).await;
        });
    }
    drop(tx);

    let mut results = Vec::with_capacity(runnable.len());
    while let Some(item) = rx.recv().await {
        results.push(item);
    }
    results
}

/// Handle one iteration where nothing is runnable: either the run is
/// finished (success/failure/fix-loop retry), or it's genuinely blocked and
/// should back off before trying again. Returns `Some(outcome)` when the
/// loop should stop, `None` to have the caller `continue`.
async fn handle_idle_iteration(
    state_root: &StateRootConfig,
    job_id: &str,
    state: &mut TeamState,
    config: &EngineConfig,
    now: chrono::DateTime<Utc>,
    idle_iterations: &mut u32,
) -> EngineResult<Option<EngineOutcome>> {
    if scheduler::all_tasks_finished(state) {
        let has_failed = state.tasks.iter().any(|t| t.status == TaskStatus::Failed);
        if has_failed && state.fix_attempts < state.max_fix_attempts {
            if let Some(recovered) = scheduler::build_failure_recovery(state, now) {
                *state = recovered;
                persist_state(state_root, job_id, state).await?;
                event_log::append(
                    state_root,
                    job_id,
                    EventType::TeamRetry,
                    "fix loop restarting failed tasks".to_string(),
                    Some(serde_json::json!({"fixAttempts": state.fix_attempts})),
                )
                .await?;
                *idle_iterations = 0;
                return Ok(None);
            }
        }

        let succeeded = !has_failed;
        state.status = if succeeded { JobStatus::Succeeded } else { JobStatus::Failed };
        persist_state(state_root, job_id, state).await?;
        job_store::update(state_root, job_id, |r| {
            r.status = state.status;
            r.finished_at = Some(now);
            if !succeeded {
                r.error = Some("team run finished with one or more failed tasks".to_string());
            }
        })
        .await?;
        event_log::append(
            state_root,
            job_id,
            EventType::TeamCompleted,
            format!("team run finished: {}", state.status),
            None,
        )
        .await?;
        return Ok(Some(if succeeded { EngineOutcome::Succeeded } else { EngineOutcome::Failed }));
    }

    let running_or_queued = state.tasks.iter().any(|t| matches!(t.status, TaskStatus::Running | TaskStatus::Queued));
    if !running_or_queued {
        let has_failed = state.tasks.iter().any(|t| t.status == TaskStatus::Failed);
        if has_failed && state.fix_attempts < state.max_fix_attempts {
            if let Some(recovered) = scheduler::build_failure_recovery(state, now) {
                *state = recovered;
                persist_state(state_root, job_id, state).await?;
                event_log::append(
                    state_root,
                    job_id,
                    EventType::TeamRetry,
                    "fix loop restarting blocked tasks".to_string(),
                    None,
                )
                .await?;
                *idle_iterations = 0;
                return Ok(None);
            }
        }

        state.status = JobStatus::Failed;
        persist_state(state_root, job_id, state).await?;
        job_store::update(state_root, job_id, |r| {
            r.status = JobStatus::Failed;
            r.finished_at = Some(now);
            r.error = Some("team run deadlocked: no runnable tasks and no recovery path".to_string());
        })
        .await?;
        event_log::append(state_root, job_id, EventType::Failed, "team run deadlocked".to_string(), None).await?;
        return Err(EngineError::DeadlockExhausted);
    }

    persist_state(state_root, job_id, state).await?;
    *idle_iterations += 1;
    if *idle_iterations > config.idle_backoff.max_idle_iterations {
        state.status = JobStatus::Failed;
        persist_state(state_root, job_id, state).await?;
        job_store::update(state_root, job_id, |r| {
            r.status = JobStatus::Failed;
            r.finished_at = Some(now);
            r.error = Some("team run loop timed out while waiting for task progress".to_string());
        })
        .await?;
        event_log::append(
            state_root,
            job_id,
            EventType::Failed,
            "team run loop timed out while waiting for task progress".to_string(),
            None,
        )
        .await?;
        return Err(EngineError::TimeoutIdle);
    }

    tokio::time::sleep(jittered_backoff(&config.idle_backoff, *idle_iterations)).await;
    Ok(None)
}

fn terminal_outcome(status: JobStatus) -> EngineOutcome {
    match status {
        JobStatus::Succeeded => EngineOutcome::Succeeded,
        JobStatus::Canceled => EngineOutcome::Canceled,
        _ => EngineOutcome::Failed,
    }
}

fn extract_team_state(job: &JobRecord) -> TeamState {
    job.options.team_state.clone().unwrap_or_else(|| {
        TeamState::new(job.options.team_parallel_tasks.unwrap_or(1), job.options.team_max_fix_attempts.unwrap_or(0))
    })
}

async fn persist_state(state_root: &StateRootConfig, job_id: &str, state: &TeamState) -> EngineResult<()> {
    job_store::update(state_root, job_id, |r| {
        r.options.team_state = Some(state.clone());
    })
    .await?;
    Ok(())
}

fn jittered_backoff(cfg: &IdleBackoffConfig, idle_iterations: u32) -> Duration {
    let base_delay = cfg.delay_for(idle_iterations);
    let factor = rand::rng().random_range(0.75..=1.25);
    Duration::from_millis((base_delay.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_outcome_maps_statuses() {
        assert_eq!(terminal_outcome(JobStatus::Succeeded), EngineOutcome::Succeeded);
        assert_eq!(terminal_outcome(JobStatus::Canceled), EngineOutcome::Canceled);
        assert_eq!(terminal_outcome(JobStatus::Failed), EngineOutcome::Failed);
    }

    #[test]
    fn jittered_backoff_stays_within_25_percent_of_base() {
        let cfg = IdleBackoffConfig { base: Duration::from_millis(800), max: Duration::from_millis(8_000), max_idle_iterations: 600 };
        let base = cfg.delay_for(3);
        for _ in 0..50 {
            let d = jittered_backoff(&cfg, 3);
            assert!(d.as_millis() as f64 >= base.as_millis() as f64 * 0.70);
            assert!(d.as_millis() as f64 <= base.as_millis() as f64 * 1.30);
        }
    }
}
