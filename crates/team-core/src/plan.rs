//! The initial team plan a job starts with: either the caller's
//! `team.teamTasks` template, or the built-in six-role serial chain
//! (planner -> researcher -> designer -> developer -> executor -> verifier).

use team_store::models::{Role, TaskStatus, TeamTask, TeamTaskTemplate};

use crate::scheduler;

/// Default attempt ceiling and per-task timeout for a plan built here; a
/// caller-supplied template may override either per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// The built-in id scheme: `team-<role>`, so a mailbox reassign instruction
/// can address a default-plan task by role without knowing a generated id.
pub fn default_task_id(role: Role) -> String {
    format!("team-{role}")
}

/// Build the default six-role serial plan for `task_text`: the planner has
/// no dependencies and starts `queued`; every later role depends only on
/// its immediate predecessor and starts `blocked`.
pub fn build_default_plan(task_text: &str) -> Vec<TeamTask> {
    let mut tasks = Vec::with_capacity(Role::ORDER.len());
    let mut prev_id: Option<String> = None;

    for role in Role::ORDER {
        let id = default_task_id(role);
        let dependencies = prev_id.clone().into_iter().collect();
        tasks.push(blank_task(id.clone(), format!("{role}: {task_text}"), role, dependencies));
        prev_id = Some(id);
    }

    finalize_readiness(tasks)
}

/// Build a plan from a caller-supplied template, falling back to this
/// module's defaults for any field the template omits.
pub fn build_plan_from_template(templates: &[TeamTaskTemplate], task_text: &str) -> Vec<TeamTask> {
    let tasks = templates.iter().map(|t| task_from_template(t, task_text)).collect();
    finalize_readiness(tasks)
}

fn task_from_template(template: &TeamTaskTemplate, task_text: &str) -> TeamTask {
    let name = template.name.clone().unwrap_or_else(|| format!("{}: {task_text}", template.role));
    let mut task = blank_task(template.id.clone(), name, template.role, template.dependencies.clone());
    if let Some(max_attempts) = template.max_attempts {
        task.max_attempts = max_attempts;
    }
    if let Some(timeout_seconds) = template.timeout_seconds {
        task.timeout_seconds = timeout_seconds;
    }
    task
}

fn blank_task(id: String, name: String, role: Role, dependencies: Vec<String>) -> TeamTask {
    TeamTask {
        id,
        name,
        role,
        dependencies,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        status: TaskStatus::Blocked,
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

fn finalize_readiness(mut tasks: Vec<TeamTask>) -> Vec<TeamTask> {
    let snapshot = tasks.clone();
    for task in tasks.iter_mut() {
        task.status = if scheduler::deps_satisfied(task, &snapshot) { TaskStatus::Queued } else { TaskStatus::Blocked };
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use team_store::models::TeamMetrics;

    #[test]
    fn default_plan_has_one_queued_planner_and_five_blocked_tasks() {
        let tasks = build_default_plan("rename the sort key");
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[0].id, "team-planner");
        assert_eq!(tasks[0].status, TaskStatus::Queued);
        assert!(tasks[1..].iter().all(|t| t.status == TaskStatus::Blocked));

        let metrics = TeamMetrics::recompute(&tasks);
        assert_eq!(metrics.queued, 1);
        assert_eq!(metrics.blocked, 5);
    }

    #[test]
    fn default_plan_chains_each_role_to_its_predecessor() {
        let tasks = build_default_plan("x");
        assert_eq!(tasks[1].dependencies, vec!["team-planner".to_string()]);
        assert_eq!(tasks[5].dependencies, vec!["team-executor".to_string()]);
    }

    #[test]
    fn template_plan_honors_overrides_and_defaults() {
        let templates = vec![
            TeamTaskTemplate {
                id: "solo".to_string(),
                name: Some("do everything".to_string()),
                role: Role::Developer,
                dependencies: vec![],
                max_attempts: Some(5),
                timeout_seconds: None,
            },
        ];
        let tasks = build_plan_from_template(&templates, "x");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Queued);
        assert_eq!(tasks[0].max_attempts, 5);
        assert_eq!(tasks[0].timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }
}
