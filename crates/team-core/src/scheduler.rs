//! Dependency readiness, runnable selection, batching, and the failure
//! cascade / fix-loop recovery that drives a team run forward.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use team_store::models::{JobStatus, Role, TaskStatus, TeamMetrics, TeamState, TeamTask};

use crate::config::ClaimConfig;

/// True iff every dependency of `task` has succeeded.
pub fn deps_satisfied(task: &TeamTask, tasks: &[TeamTask]) -> bool {
    task.dependencies
        .iter()
        .all(|dep_id| tasks.iter().any(|t| t.id == *dep_id && t.status == TaskStatus::Succeeded))
}

/// `isReady`: not pending approval, not a dead-end status, and every
/// dependency has succeeded.
pub fn is_ready(task: &TeamTask, tasks: &[TeamTask]) -> bool {
    !task.requires_approval && !task.status.is_dead_end() && deps_satisfied(task, tasks)
}

/// Select up to `parallel_tasks` runnable tasks, preferring earlier-role
/// work (planner before researcher before ... before verifier) when
/// capacity is scarce.
pub fn select_runnable(state: &TeamState) -> Vec<String> {
    let mut candidates: Vec<&TeamTask> = state
        .tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Blocked))
        .filter(|t| is_ready(t, &state.tasks))
        .collect();
    candidates.sort_by_key(|t| t.role.rank());
    candidates.into_iter().take(state.parallel_tasks.max(1)).map(|t| t.id.clone()).collect()
}

/// Transition `batch` into `running`, bumping each task's attempt counter
/// and issuing a fresh claim.
pub fn start_batch(
    state: &mut TeamState,
    claim_config: &ClaimConfig,
    worker_id: &str,
    batch: &[String],
    now: DateTime<Utc>,
) {
    for id in batch {
        let claim = crate::claim::issue(claim_config, worker_id, now);
        if let Some(task) = state.task_mut(id) {
            task.attempt += 1;
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
            task.finished_at = None;
            task.error = None;
            task.worker_id = Some(claim.worker_id);
            task.claim_token = Some(claim.claim_token);
            task.claim_expires_at = Some(claim.claim_expires_at);
            task.last_heartbeat_at = Some(claim.last_heartbeat_at);
        }
    }
}

/// A partial mutation to apply to one task once its execution attempt has
/// finished, produced by the role executor.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    /// `Some(None)` clears the error, `Some(Some(msg))` sets it, `None`
    /// leaves the existing value untouched.
    pub error: Option<Option<String>>,
    pub output: Option<Option<Value>>,
    pub requires_approval: Option<bool>,
    pub finished_at: Option<DateTime<Utc>>,
    pub clear_claim: bool,
}

/// Apply `patch` to `task_id`, then re-promote any `blocked` task whose
/// dependencies are now satisfied.
pub fn apply_task_patch(state: &mut TeamState, task_id: &str, patch: TaskPatch) {
    if let Some(task) = state.task_mut(task_id) {
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(error) = patch.error {
            task.error = error;
        }
        if let Some(output) = patch.output {
            task.output = output;
        }
        if let Some(requires_approval) = patch.requires_approval {
            task.requires_approval = requires_approval;
        }
        if let Some(finished_at) = patch.finished_at {
            task.finished_at = Some(finished_at);
        }
        if patch.clear_claim {
            task.clear_claim();
        }
    }
    state.current_task_id = Some(task_id.to_string());
    promote_ready_blocked_tasks(state);
}

fn promote_ready_blocked_tasks(state: &mut TeamState) {
    let snapshot = state.tasks.clone();
    for task in state.tasks.iter_mut() {
        if task.status == TaskStatus::Blocked && is_ready(task, &snapshot) {
            task.status = TaskStatus::Queued;
        }
    }
}

/// Every task id that is itself `failed`, or transitively depends (directly
/// or indirectly) on a failed task.
pub fn collect_failure_cascade(state: &TeamState) -> HashSet<String> {
    let mut cascade: HashSet<String> =
        state.tasks.iter().filter(|t| t.status == TaskStatus::Failed).map(|t| t.id.clone()).collect();

    loop {
        let mut added = false;
        for task in &state.tasks {
            if cascade.contains(&task.id) {
                continue;
            }
            if task.dependencies.iter().any(|dep| cascade.contains(dep)) {
                cascade.insert(task.id.clone());
                added = true;
            }
        }
        if !added {
            break;
        }
    }

    cascade
}

/// Build the next `TeamState` for a fix-loop retry: reset every task in the
/// failure cascade back to `queued`/`blocked`, bump `fix_attempts`, and
/// recompute metrics. `None` if there is nothing to recover (no failed
/// tasks).
pub fn build_failure_recovery(state: &TeamState, now: DateTime<Utc>) -> Option<TeamState> {
    if !state.tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        return None;
    }

    let cascade = collect_failure_cascade(state);
    let mut next = state.clone();

    for task in next.tasks.iter_mut() {
        if cascade.contains(&task.id) {
            task.started_at = None;
            task.finished_at = None;
            task.output = None;
            task.error = None;
            task.requires_approval = false;
            task.clear_claim();
        }
    }

    let snapshot = next.tasks.clone();
    for task in next.tasks.iter_mut() {
        if cascade.contains(&task.id) {
            task.status = if deps_satisfied(task, &snapshot) { TaskStatus::Queued } else { TaskStatus::Blocked };
        }
    }

    next.fix_attempts += 1;
    next.status = JobStatus::Running;
    next.approval_task_id = None;
    next.metrics = TeamMetrics::recompute(&next.tasks);
    let _ = now;
    Some(next)
}

/// True once every task has reached a dead-end status.
pub fn all_tasks_finished(state: &TeamState) -> bool {
    state.tasks.iter().all(|t| t.status.is_dead_end())
}

/// The team run's human-readable phase: the role of whatever is currently
/// running or next queued, `retry_<role>` while a failed task awaits the
/// fix loop, or `completed`/`blocked` at the edges.
pub fn phase(tasks: &[TeamTask]) -> String {
    if let Some(task) = tasks.iter().find(|t| t.status == TaskStatus::Running) {
        return task.role.to_string();
    }
    if let Some(task) = tasks.iter().find(|t| t.status == TaskStatus::Queued) {
        return task.role.to_string();
    }
    if let Some(task) = tasks.iter().find(|t| t.status == TaskStatus::Failed) {
        return format!("retry_{}", task.role);
    }
    if let Some(task) = tasks.iter().find(|t| t.status == TaskStatus::Blocked) {
        return task.role.to_string();
    }
    if tasks.iter().all(|t| t.status == TaskStatus::Succeeded) {
        return "completed".to_string();
    }
    "blocked".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, role: Role, status: TaskStatus, deps: &[&str]) -> TeamTask {
        TeamTask {
            id: id.to_string(),
            name: id.to_string(),
            role,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            max_attempts: 3,
            timeout_seconds: 600,
            status,
            attempt: 0,
            started_at: None,
            finished_at: None,
            worker_id: None,
            claim_token: None,
            claim_expires_at: None,
            last_heartbeat_at: None,
            error: None,
            output: None,
            requires_approval: false,
        }
    }

    #[test]
    fn select_runnable_prefers_earlier_role_order_under_capacity() {
        let mut state = TeamState::new(1, 1);
        state.tasks.push(task("dev", Role::Developer, TaskStatus::Queued, &[]));
        state.tasks.push(task("plan", Role::Planner, TaskStatus::Queued, &[]));
        let runnable = select_runnable(&state);
        assert_eq!(runnable, vec!["plan".to_string()]);
    }

    #[test]
    fn select_runnable_skips_tasks_with_unmet_dependencies() {
        let mut state = TeamState::new(4, 1);
        state.tasks.push(task("a", Role::Planner, TaskStatus::Queued, &[]));
        state.tasks.push(task("b", Role::Developer, TaskStatus::Blocked, &["a"]));
        let runnable = select_runnable(&state);
        assert_eq!(runnable, vec!["a".to_string()]);
    }

    #[test]
    fn select_runnable_skips_tasks_pending_approval() {
        let mut state = TeamState::new(4, 1);
        let mut t = task("a", Role::Planner, TaskStatus::Queued, &[]);
        t.requires_approval = true;
        state.tasks.push(t);
        assert!(select_runnable(&state).is_empty());
    }

    #[test]
    fn apply_task_patch_promotes_blocked_dependents() {
        let mut state = TeamState::new(4, 1);
        state.tasks.push(task("a", Role::Planner, TaskStatus::Running, &[]));
        state.tasks.push(task("b", Role::Developer, TaskStatus::Blocked, &["a"]));
        apply_task_patch(
            &mut state,
            "a",
            TaskPatch { status: Some(TaskStatus::Succeeded), clear_claim: true, ..Default::default() },
        );
        assert_eq!(state.task("b").unwrap().status, TaskStatus::Queued);
    }

    #[test]
    fn collect_failure_cascade_includes_transitive_dependents() {
        let mut state = TeamState::new(4, 1);
        state.tasks.push(task("a", Role::Planner, TaskStatus::Failed, &[]));
        state.tasks.push(task("b", Role::Developer, TaskStatus::Blocked, &["a"]));
        state.tasks.push(task("c", Role::Verifier, TaskStatus::Blocked, &["b"]));
        state.tasks.push(task("d", Role::Researcher, TaskStatus::Succeeded, &[]));
        let cascade = collect_failure_cascade(&state);
        assert!(cascade.contains("a"));
        assert!(cascade.contains("b"));
        assert!(cascade.contains("c"));
        assert!(!cascade.contains("d"));
    }

    #[test]
    fn build_failure_recovery_resets_cascade_and_bumps_fix_attempts() {
        let mut state = TeamState::new(4, 2);
        let mut failed = task("a", Role::Planner, TaskStatus::Failed, &[]);
        failed.error = Some("boom".to_string());
        state.tasks.push(failed);
        state.tasks.push(task("b", Role::Developer, TaskStatus::Blocked, &["a"]));

        let recovered = build_failure_recovery(&state, Utc::now()).unwrap();
        assert_eq!(recovered.fix_attempts, 1);
        assert_eq!(recovered.task("a").unwrap().status, TaskStatus::Queued);
        assert_eq!(recovered.task("b").unwrap().status, TaskStatus::Blocked);
        assert!(recovered.task("a").unwrap().error.is_none());
    }

    #[test]
    fn build_failure_recovery_is_none_without_failures() {
        let mut state = TeamState::new(4, 2);
        state.tasks.push(task("a", Role::Planner, TaskStatus::Succeeded, &[]));
        assert!(build_failure_recovery(&state, Utc::now()).is_none());
    }

    #[test]
    fn phase_reports_retry_prefix_for_failed_task() {
        let tasks = vec![task("a", Role::Developer, TaskStatus::Failed, &[])];
        assert_eq!(phase(&tasks), "retry_developer");
    }

    #[test]
    fn phase_reports_completed_when_all_succeeded() {
        let tasks = vec![task("a", Role::Developer, TaskStatus::Succeeded, &[])];
        assert_eq!(phase(&tasks), "completed");
    }

    #[test]
    fn all_tasks_finished_false_with_any_non_dead_end_task() {
        let tasks = vec![
            task("a", Role::Developer, TaskStatus::Succeeded, &[]),
            task("b", Role::Verifier, TaskStatus::Queued, &["a"]),
        ];
        assert!(!all_tasks_finished(&tasks_as_state(tasks)));
    }

    fn tasks_as_state(tasks: Vec<TeamTask>) -> TeamState {
        let mut state = TeamState::new(1, 1);
        state.tasks = tasks;
        state
    }
}
