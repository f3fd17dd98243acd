//! Claim issuance and the expiry / non-reporting predicates that drive
//! dead-worker reclaim.

use chrono::{DateTime, Utc};

use team_store::models::{TaskStatus, TeamState, TeamTask};

use crate::config::ClaimConfig;
use crate::scheduler;

/// Fresh claim fields for a task about to start running, owned by
/// `worker_id`.
pub struct Claim {
    pub worker_id: String,
    pub claim_token: String,
    pub claim_expires_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Issue a brand new claim for `worker_id` at `now`.
pub fn issue(config: &ClaimConfig, worker_id: &str, now: DateTime<Utc>) -> Claim {
    Claim {
        worker_id: worker_id.to_string(),
        claim_token: uuid::Uuid::new_v4().to_string(),
        claim_expires_at: now + lease_duration(config),
        last_heartbeat_at: now,
    }
}

fn lease_duration(config: &ClaimConfig) -> chrono::Duration {
    chrono::Duration::from_std(config.lease()).unwrap_or(chrono::Duration::seconds(75))
}

fn grace_duration(config: &ClaimConfig) -> chrono::Duration {
    chrono::Duration::from_std(config.effective_grace()).unwrap_or(chrono::Duration::seconds(30))
}

/// `isClaimExpired`: a running task has expired if its claim fields are
/// missing, its lease has passed, or its heartbeat has gone stale past the
/// effective grace window.
pub fn is_claim_expired(config: &ClaimConfig, task: &TeamTask, now: DateTime<Utc>) -> bool {
    if task.status != TaskStatus::Running {
        return false;
    }
    match (task.claim_expires_at, task.last_heartbeat_at) {
        (None, _) | (_, None) => true,
        (Some(expires_at), Some(last_heartbeat)) => {
            expires_at <= now || now.signed_duration_since(last_heartbeat) > grace_duration(config)
        }
    }
}

/// `isNonReporting`: narrower than [`is_claim_expired`] — only true when the
/// heartbeat itself is the stale signal, used purely for the distinct
/// `team.task.non_reporting` observability event.
pub fn is_non_reporting(config: &ClaimConfig, task: &TeamTask, now: DateTime<Utc>) -> bool {
    if task.status != TaskStatus::Running {
        return false;
    }
    match task.last_heartbeat_at {
        None => true,
        Some(last_heartbeat) => now.signed_duration_since(last_heartbeat) > grace_duration(config),
    }
}

/// Refresh the heartbeat on a task this worker owns. No-op when another
/// worker id holds the claim, so a second live orchestrator doesn't stomp
/// on the first's lease.
pub fn refresh_heartbeat(config: &ClaimConfig, task: &mut TeamTask, worker_id: &str, now: DateTime<Utc>) {
    if task.worker_id.as_deref() != Some(worker_id) {
        return;
    }
    task.last_heartbeat_at = Some(now);
    task.claim_expires_at = Some(now + lease_duration(config));
}

/// Refresh every task this worker currently owns.
pub fn refresh_own_claims(state: &mut TeamState, config: &ClaimConfig, worker_id: &str, now: DateTime<Utc>) {
    for task in state.tasks.iter_mut() {
        if task.status == TaskStatus::Running {
            refresh_heartbeat(config, task, worker_id, now);
        }
    }
}

/// One task that was reclaimed this pass, and whether it was specifically
/// the non-reporting predicate (vs. plain lease expiry) that triggered it.
#[derive(Debug, Clone)]
pub struct ReclaimedTask {
    pub task_id: String,
    pub non_reporting: bool,
}

/// Reclaim every expired or non-reporting running task: clear its claim,
/// append an error reason, and return it to `queued`/`blocked` based on
/// whether its dependencies are satisfied.
pub fn reclaim_expired(state: &mut TeamState, config: &ClaimConfig, now: DateTime<Utc>) -> Vec<ReclaimedTask> {
    let snapshot = state.tasks.clone();
    let mut reclaimed = Vec::new();

    for task in state.tasks.iter_mut() {
        if task.status != TaskStatus::Running || !is_claim_expired(config, task, now) {
            continue;
        }
        let non_reporting = is_non_reporting(config, task, now);
        let ready = scheduler::deps_satisfied(task, &snapshot);
        let reason = if non_reporting { "non-reporting worker detected" } else { "claim lease expired" };

        task.clear_claim();
        task.error = Some(reason.to_string());
        task.status = if ready { TaskStatus::Queued } else { TaskStatus::Blocked };

        reclaimed.push(ReclaimedTask { task_id: task.id.clone(), non_reporting });
    }

    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use team_store::models::Role;

    fn running_task(id: &str) -> TeamTask {
        TeamTask {
            id: id.to_string(),
            name: id.to_string(),
            role: Role::Executor,
            dependencies: vec![],
            max_attempts: 3,
            timeout_seconds: 600,
            status: TaskStatus::Running,
            attempt: 1,
            started_at: Some(Utc::now()),
            finished_at: None,
            worker_id: Some("worker-a".to_string()),
            claim_token: Some("tok".to_string()),
            claim_expires_at: Some(Utc::now() + chrono::Duration::seconds(60)),
            last_heartbeat_at: Some(Utc::now()),
            error: None,
            output: None,
            requires_approval: false,
        }
    }

    fn cfg() -> ClaimConfig {
        ClaimConfig {
            claim_ttl: std::time::Duration::from_secs(60),
            lease_slack: std::time::Duration::from_secs(15),
            heartbeat_interval: std::time::Duration::from_secs(10),
            non_reporting_grace: std::time::Duration::from_secs(30),
        }
    }

    #[test]
    fn fresh_claim_is_not_expired() {
        let task = running_task("a");
        assert!(!is_claim_expired(&cfg(), &task, Utc::now()));
    }

    #[test]
    fn missing_claim_fields_are_expired() {
        let mut task = running_task("a");
        task.claim_expires_at = None;
        assert!(is_claim_expired(&cfg(), &task, Utc::now()));
    }

    #[test]
    fn stale_heartbeat_beyond_grace_is_expired_and_non_reporting() {
        let mut task = running_task("a");
        let now = Utc::now();
        task.last_heartbeat_at = Some(now - chrono::Duration::seconds(61));
        task.claim_expires_at = Some(now + chrono::Duration::seconds(60));
        assert!(is_claim_expired(&cfg(), &task, now));
        assert!(is_non_reporting(&cfg(), &task, now));
    }

    #[test]
    fn refresh_heartbeat_noops_for_other_worker() {
        let mut task = running_task("a");
        let before = task.claim_expires_at;
        refresh_heartbeat(&cfg(), &mut task, "worker-b", Utc::now());
        assert_eq!(task.claim_expires_at, before);
    }

    #[test]
    fn reclaim_expired_clears_claim_and_requeues_ready_task() {
        let mut state = TeamState::new(1, 1);
        let mut task = running_task("a");
        task.claim_expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        state.tasks.push(task);

        let reclaimed = reclaim_expired(&mut state, &cfg(), Utc::now());
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].task_id, "a");
        let task = state.task("a").unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.worker_id.is_none());
        assert!(task.error.as_deref().unwrap().contains("claim lease expired"));
    }

    #[test]
    fn reclaim_expired_blocks_task_with_unmet_dependency() {
        let mut state = TeamState::new(1, 1);
        let mut dep = running_task("dep");
        dep.status = TaskStatus::Queued;
        dep.started_at = None;
        dep.worker_id = None;
        dep.claim_token = None;
        dep.claim_expires_at = None;
        dep.last_heartbeat_at = None;
        state.tasks.push(dep);

        let mut task = running_task("a");
        task.dependencies = vec!["dep".to_string()];
        task.claim_expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        state.tasks.push(task);

        reclaim_expired(&mut state, &cfg(), Utc::now());
        assert_eq!(state.task("a").unwrap().status, TaskStatus::Blocked);
    }
}
