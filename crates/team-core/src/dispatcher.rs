//! The job dispatcher: claims a job id off the work queue, routes it to
//! the team engine loop, and persists the terminal result.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use team_store::config::StateRootConfig;
use team_store::models::{ApprovalState, EventType, JobStatus, TeamMetrics, TeamState};
use team_store::{event_log, job_store, queue};

use crate::config::EngineConfig;
use crate::engine::{self, EngineOutcome};
use crate::error::EngineResult;
use crate::{plan, scheduler};

/// Claim one job off the queue and run it to completion (or an approval
/// pause), releasing the queue claim in every case including failure.
/// Returns `Ok(None)` if the queue had nothing to claim.
pub async fn dispatch_one(
    state_root: &StateRootConfig,
    worker_id: &str,
    config: &EngineConfig,
    cancel: CancellationToken,
) -> EngineResult<Option<EngineOutcome>> {
    let claimed = match queue::claim(state_root).await? {
        Some(c) => c,
        None => return Ok(None),
    };
    let job_id = claimed.job_id.clone();

    let job = job_store::read(state_root, &job_id).await?;
    if job.status == JobStatus::Queued {
        job_store::update(state_root, &job_id, |r| {
            r.status = JobStatus::Running;
            r.started_at = Some(Utc::now());
            // A job submitted without an explicit `team.state` option starts
            // the run with no plan at all; seed it here from the caller's
            // `team.teamTasks` template, or the built-in six-role chain.
            if r.options.team_state.is_none() {
                let parallel_tasks = r.options.team_parallel_tasks.unwrap_or(1);
                let max_fix_attempts = r.options.team_max_fix_attempts.unwrap_or(0);
                let mut state = TeamState::new(parallel_tasks, max_fix_attempts);
                state.tasks = match &r.options.team_tasks_template {
                    Some(templates) if !templates.is_empty() => plan::build_plan_from_template(templates, &r.task),
                    _ => plan::build_default_plan(&r.task),
                };
                state.metrics = TeamMetrics::recompute(&state.tasks);
                state.phase = scheduler::phase(&state.tasks);
                r.options.team_state = Some(state);
            }
        })
        .await?;
        event_log::append(state_root, &job_id, EventType::Queued, "job claimed by worker".to_string(), None).await?;
    }

    let outcome = engine::run(state_root, &job_id, worker_id, config, cancel).await;

    match &outcome {
        Ok(EngineOutcome::Succeeded) => {
            job_store::update(state_root, &job_id, |r| {
                r.status = JobStatus::Succeeded;
                r.finished_at = Some(Utc::now());
            })
            .await?;
        }
        Ok(EngineOutcome::Failed) => {
            job_store::update(state_root, &job_id, |r| {
                if !r.status.is_terminal() {
                    r.status = JobStatus::Failed;
                    r.finished_at = Some(Utc::now());
                }
            })
            .await?;
        }
        Ok(EngineOutcome::Canceled) => {
            job_store::update(state_root, &job_id, |r| {
                r.status = JobStatus::Canceled;
                r.finished_at = Some(Utc::now());
            })
            .await?;
        }
        Ok(EngineOutcome::WaitingApproval) => {
            job_store::update(state_root, &job_id, |r| {
                r.status = JobStatus::WaitingApproval;
                r.approval_state = ApprovalState::Required;
            })
            .await?;
        }
        Err(err) => {
            job_store::update(state_root, &job_id, |r| {
                if !r.status.is_terminal() {
                    r.status = JobStatus::Failed;
                    r.finished_at = Some(Utc::now());
                    r.error = Some(err.to_string());
                }
            })
            .await?;
        }
    }

    queue::release(state_root, &claimed.queue_entry).await?;
    outcome.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use team_store::models::{JobOptions, Mode, NewJob, Provider};

    #[tokio::test]
    async fn dispatch_one_returns_none_when_queue_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state_root = StateRootConfig::at(dir.path());
        let config = EngineConfig::from_env();
        let result = dispatch_one(&state_root, "worker-1", &config, CancellationToken::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn dispatch_one_claims_and_runs_job_with_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let state_root = StateRootConfig::at(dir.path());
        let config = EngineConfig::from_env();

        // An explicit, already-empty team state opts this job out of the
        // default plan so the run finishes immediately with nothing to do.
        let mut options = JobOptions::default();
        options.team_state = Some(TeamState::new(1, 0));

        let job = job_store::create(
            &state_root,
            NewJob {
                provider: Provider::Claude,
                mode: Mode::Team,
                repo: "repo".to_string(),
                git_ref: "main".to_string(),
                task: "do the thing".to_string(),
                options,
                require_approval: false,
            },
        )
        .await
        .unwrap();
        queue::enqueue(&state_root, &job.id).await.unwrap();

        let outcome = dispatch_one(&state_root, "worker-1", &config, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, Some(EngineOutcome::Succeeded));

        let updated = job_store::read(&state_root, &job.id).await.unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn dispatch_one_seeds_the_default_six_task_plan_for_a_fresh_job() {
        let dir = tempfile::tempdir().unwrap();
        let state_root = StateRootConfig::at(dir.path());

        let job = job_store::create(
            &state_root,
            NewJob {
                provider: Provider::Claude,
                mode: Mode::Team,
                repo: "repo".to_string(),
                git_ref: "main".to_string(),
                task: "rename the sort key".to_string(),
                options: JobOptions::default(),
                require_approval: false,
            },
        )
        .await
        .unwrap();
        queue::enqueue(&state_root, &job.id).await.unwrap();

        let claimed = queue::claim(&state_root).await.unwrap().unwrap();
        job_store::update(&state_root, &job.id, |r| {
            r.status = JobStatus::Running;
            if r.options.team_state.is_none() {
                let mut state = TeamState::new(1, 0);
                state.tasks = plan::build_default_plan(&r.task);
                state.metrics = TeamMetrics::recompute(&state.tasks);
                r.options.team_state = Some(state);
            }
        })
        .await
        .unwrap();
        queue::release(&state_root, &claimed.queue_entry).await.unwrap();

        let updated = job_store::read(&state_root, &job.id).await.unwrap();
        let state = updated.options.team_state.unwrap();
        assert_eq!(state.tasks.len(), 6);
        assert_eq!(state.metrics.queued, 1);
        assert_eq!(state.metrics.blocked, 5);
    }
}
