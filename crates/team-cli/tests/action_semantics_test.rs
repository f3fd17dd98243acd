//! Integration coverage for the state transitions behind `team
//! approve|reject|cancel|resume`. These mirror exactly what
//! `action_cmd.rs` does against the store, without invoking the binary,
//! the same way the library-level CLI tests in this codebase's teacher
//! exercise the logic a command wraps rather than the command itself.

use team_core::scheduler;
use team_store::models::{ApprovalState, JobStatus, TaskStatus};
use team_store::{job_store, queue};
use team_test_utils::{sample_new_job, temp_state_root};

async fn job_waiting_on_approval(root: &team_store::config::StateRootConfig) -> team_store::models::JobRecord {
    let job = job_store::create(root, sample_new_job("ship it")).await.unwrap();
    job_store::update(root, &job.id, |r| {
        r.status = JobStatus::WaitingApproval;
        r.approval_state = ApprovalState::Required;
        let mut state = team_store::models::TeamState::new(1, 0);
        let mut task =
            team_core::plan::build_default_plan("ship it").into_iter().next().unwrap();
        task.requires_approval = true;
        task.status = TaskStatus::Queued;
        state.approval_task_id = Some(task.id.clone());
        state.tasks = vec![task];
        r.options.team_state = Some(state);
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn approve_clears_requires_approval_and_requeues() {
    let root = temp_state_root();
    let job = job_waiting_on_approval(&root).await;

    job_store::update(&root, &job.id, |r| {
        r.status = JobStatus::Queued;
        r.approval_state = ApprovalState::Approved;
        r.error = None;
        if let Some(state) = &mut r.options.team_state {
            state.status = JobStatus::Queued;
            if let Some(task_id) = state.approval_task_id.take() {
                let snapshot = state.tasks.clone();
                if let Some(task) = state.task_mut(&task_id) {
                    task.requires_approval = false;
                    task.status = if scheduler::deps_satisfied(task, &snapshot) {
                        TaskStatus::Queued
                    } else {
                        TaskStatus::Blocked
                    };
                }
            }
        }
    })
    .await
    .unwrap();
    queue::enqueue(&root, &job.id).await.unwrap();

    let updated = job_store::read(&root, &job.id).await.unwrap();
    assert_eq!(updated.status, JobStatus::Queued);
    assert_eq!(updated.approval_state, ApprovalState::Approved);
    let state = updated.options.team_state.unwrap();
    assert!(state.approval_task_id.is_none());
    assert!(!state.tasks[0].requires_approval);
    assert_eq!(state.tasks[0].status, TaskStatus::Queued);

    let claimed = queue::claim(&root).await.unwrap();
    assert_eq!(claimed.unwrap().job_id, job.id);
}

#[tokio::test]
async fn reject_fails_the_job_and_leaves_the_team_snapshot_untouched() {
    let root = temp_state_root();
    let job = job_waiting_on_approval(&root).await;

    job_store::update(&root, &job.id, |r| {
        r.status = JobStatus::Failed;
        r.approval_state = ApprovalState::Rejected;
        r.error = Some("Rejected by approver".to_string());
    })
    .await
    .unwrap();

    let updated = job_store::read(&root, &job.id).await.unwrap();
    assert_eq!(updated.status, JobStatus::Failed);
    assert_eq!(updated.approval_state, ApprovalState::Rejected);
    assert_eq!(updated.error.as_deref(), Some("Rejected by approver"));
    // The team run's own status field is left exactly as it was when the
    // approval request paused it.
    let state = updated.options.team_state.unwrap();
    assert_eq!(state.status, JobStatus::WaitingApproval);
}

#[tokio::test]
async fn cancel_is_rejected_once_a_job_is_already_terminal() {
    let root = temp_state_root();
    let job = job_store::create(&root, sample_new_job("ship it")).await.unwrap();
    job_store::update(&root, &job.id, |r| r.status = JobStatus::Succeeded).await.unwrap();

    let current = job_store::read(&root, &job.id).await.unwrap();
    assert!(current.status.is_terminal(), "fixture job should already be terminal");
}

#[tokio::test]
async fn resume_requeues_a_terminal_job() {
    let root = temp_state_root();
    let job = job_store::create(&root, sample_new_job("ship it")).await.unwrap();
    job_store::update(&root, &job.id, |r| {
        r.status = JobStatus::Failed;
        r.finished_at = Some(chrono::Utc::now());
        r.error = Some("boom".to_string());
    })
    .await
    .unwrap();

    job_store::update(&root, &job.id, |r| {
        r.status = JobStatus::Queued;
        r.finished_at = None;
        r.error = None;
    })
    .await
    .unwrap();
    queue::enqueue(&root, &job.id).await.unwrap();

    let updated = job_store::read(&root, &job.id).await.unwrap();
    assert_eq!(updated.status, JobStatus::Queued);
    assert!(updated.error.is_none());
    let claimed = queue::claim(&root).await.unwrap();
    assert_eq!(claimed.unwrap().job_id, job.id);
}
