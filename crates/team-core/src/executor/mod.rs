//! The role executor: invokes the Agent CLI for one task, validates its
//! structured output against the task's role schema, extracts mailbox and
//! approval signals, and classifies failures for in-process retry.

pub mod parse_output;
pub mod process;
pub mod schema;
pub mod template;

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use team_store::config::StateRootConfig;
use team_store::event_log;
use team_store::models::{EventType, JobOptions, JobRecord, MailboxMessage, Role, TaskStatus, TeamTask};

use crate::config::ExecutorConfig;
use crate::error::FailureKind;
use crate::scheduler::{self, TaskPatch};

/// Default attempt ceiling and timeout given to a task materialized from a
/// planner's output, since the plan itself carries neither.
const PLANNED_TASK_MAX_ATTEMPTS: u32 = 3;
const PLANNED_TASK_TIMEOUT_SECONDS: u64 = 600;

/// What the engine should do after one role-executor invocation.
pub enum ExecutionOutcome {
    Succeeded { patch: TaskPatch, mailbox: Vec<MailboxMessage>, new_tasks: Vec<TeamTask> },
    ApprovalRequested { patch: TaskPatch, mailbox: Vec<MailboxMessage> },
    Failed { patch: TaskPatch },
}

/// Execute `task` to completion, retrying in-process on retryable
/// failures (no state write between attempts) until the effective attempt
/// ceiling is reached.
#[allow(clippy::too_many_arguments)]
pub async fn execute_task(
    state_root: &StateRootConfig,
    job_id: &str,
    job: &JobRecord,
    options: &JobOptions,
    task: &TeamTask,
    all_tasks: &[TeamTask],
    phase: &str,
    workdir: &std::path::Path,
    config: &ExecutorConfig,
) -> ExecutionOutcome {
    let binary = process::binary_for(job.provider);
    let command_template = process::resolve_command_template(job.provider, task.role, options);
    let dependency_outputs = dependency_outputs_json(task, all_tasks);
    let tokens = process::build_tokens(job, task, phase, &workdir.to_string_lossy(), &dependency_outputs);
    let command = template::render(&command_template, &tokens);
    let timeout = Duration::from_secs(task.timeout_seconds.max(30));

    let _ = event_log::append(
        state_root,
        job_id,
        EventType::TeamTaskStarted,
        format!("task {} ({}) started", task.id, task.role),
        Some(serde_json::json!({"taskId": task.id, "role": task.role.to_string(), "attempt": task.attempt})),
    )
    .await;

    let mut attempt = task.attempt.max(1);

    loop {
        let result = process::run_command(&command, &binary, workdir, timeout).await;
        let (exit_code, stdout, stderr) = match result {
            Ok(out) => (out.exit_code, out.stdout, out.stderr),
            Err(err) => (-1, String::new(), format!("failed to spawn agent CLI: {err}")),
        };

        let combined = format!("{stdout}\n{stderr}");
        let parsed = parse_output::extract_last_json_object(&combined);

        let planner_output =
            if task.role == Role::Planner { Some(schema::parse_planner_output(&parsed)) } else { None };

        let validation_error = match (&task.role, &planner_output) {
            (Role::Planner, Some(result)) => result.as_ref().err().map(|e| e.0.clone()),
            (Role::Verifier, _) => schema::validate_verifier_output(&parsed).err().map(|e| e.0),
            _ => None,
        };

        let wants_approval = schema::requires_approval(&parsed);
        let mailbox = schema::extract_mailbox(&parsed, task, Utc::now());

        let output = serde_json::json!({
            "status": if exit_code == 0 && validation_error.is_none() { "ok" } else { "error" },
            "exitCode": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "parsed": parsed,
            "task": task.name,
            "role": task.role.to_string(),
            "attempt": attempt,
        });

        if let Some(reason) = &validation_error {
            let _ = event_log::append(
                state_root,
                job_id,
                EventType::TeamTaskValidationFailed,
                format!("task {} output failed validation: {reason}", task.id),
                Some(serde_json::json!({"taskId": task.id, "attempt": attempt})),
            )
            .await;
        }

        if wants_approval {
            let _ = event_log::append(
                state_root,
                job_id,
                EventType::TeamTaskApprovalRequired,
                format!("task {} requested approval", task.id),
                Some(serde_json::json!({"taskId": task.id})),
            )
            .await;

            let patch = TaskPatch {
                status: Some(TaskStatus::Queued),
                error: Some(Some("Task output requested approval before continuing.".to_string())),
                output: Some(Some(output)),
                requires_approval: Some(true),
                finished_at: Some(Utc::now()),
                clear_claim: true,
            };
            return ExecutionOutcome::ApprovalRequested { patch, mailbox };
        }

        if exit_code == 0 && validation_error.is_none() {
            let _ = event_log::append(
                state_root,
                job_id,
                EventType::TeamTaskCompleted,
                format!("task {} succeeded", task.id),
                Some(serde_json::json!({"taskId": task.id, "attempt": attempt})),
            )
            .await;

            let new_tasks = match &planner_output {
                Some(Ok(plan)) => materialize_planned_tasks(plan, all_tasks),
                _ => Vec::new(),
            };
            if !new_tasks.is_empty() {
                let _ = event_log::append(
                    state_root,
                    job_id,
                    EventType::Log,
                    format!("planner added {} task(s) to the run", new_tasks.len()),
                    Some(serde_json::json!({"taskIds": new_tasks.iter().map(|t| t.id.clone()).collect::<Vec<_>>()})),
                )
                .await;
            }

            let patch = TaskPatch {
                status: Some(TaskStatus::Succeeded),
                error: Some(None),
                output: Some(Some(output)),
                requires_approval: Some(false),
                finished_at: Some(Utc::now()),
                clear_claim: true,
            };
            return ExecutionOutcome::Succeeded { patch, mailbox, new_tasks };
        }

        let kind = classify_failure(&combined, &parsed);
        let retry_after = parse_retry_after(&combined);
        let policy = match kind {
            FailureKind::RateLimit => config.rate_limit,
            FailureKind::General => config.general,
        };
        let effective_max = task.max_attempts.max(policy.max_attempts);

        if attempt < effective_max {
            let delay = match (kind, retry_after) {
                (FailureKind::RateLimit, Some(ra)) => ra.min(policy.max),
                _ => backoff_delay(policy.base, policy.max, attempt),
            };
            let jittered_delay = jittered(delay);

            let _ = event_log::append(
                state_root,
                job_id,
                EventType::TeamTaskRetry,
                format!("task {} retrying after {kind} failure, attempt {attempt}", task.id),
                Some(serde_json::json!({"taskId": task.id, "attempt": attempt, "kind": kind.to_string(), "delayMs": jittered_delay.as_millis()})),
            )
            .await;

            tokio::time::sleep(jittered_delay).await;
            attempt += 1;
            continue;
        }

        let error_message = validation_error.unwrap_or_else(|| truncate(&format!("{stderr}\n{stdout}"), 4000));
        let patch = TaskPatch {
            status: Some(TaskStatus::Failed),
            error: Some(Some(error_message)),
            output: Some(Some(output)),
            requires_approval: Some(false),
            finished_at: Some(Utc::now()),
            clear_claim: true,
        };
        return ExecutionOutcome::Failed { patch };
    }
}

/// Turn a validated planner plan into new [`TeamTask`]s, skipping any id
/// that already exists in the run (a planner re-running after a fix-loop
/// retry will typically re-describe tasks that are already present).
/// Dependency readiness is computed against the combined existing-plus-new
/// task list, so a planned task whose only dependency is another planned
/// task in the same batch can still start out `queued` rather than
/// `blocked` when that dependency has no further dependencies of its own.
fn materialize_planned_tasks(plan: &schema::PlannerOutput, existing: &[TeamTask]) -> Vec<TeamTask> {
    let mut combined: Vec<TeamTask> = existing.to_vec();
    let mut new_tasks = Vec::new();

    for planned in &plan.tasks {
        if existing.iter().any(|t| t.id == planned.id) {
            continue;
        }
        let task = TeamTask {
            id: planned.id.clone(),
            name: planned.name.clone(),
            role: planned.role,
            dependencies: planned.dependencies.clone(),
            max_attempts: PLANNED_TASK_MAX_ATTEMPTS,
            timeout_seconds: PLANNED_TASK_TIMEOUT_SECONDS,
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
        };
        combined.push(task);
        new_tasks.push(combined.len() - 1);
    }

    for &idx in &new_tasks {
        let ready = scheduler::deps_satisfied(&combined[idx], &combined);
        combined[idx].status = if ready { TaskStatus::Queued } else { TaskStatus::Blocked };
    }

    new_tasks.into_iter().map(|idx| combined[idx].clone()).collect()
}

fn dependency_outputs_json(task: &TeamTask, all_tasks: &[TeamTask]) -> String {
    let mut map = serde_json::Map::new();
    for dep_id in &task.dependencies {
        if let Some(dep) = all_tasks.iter().find(|t| &t.id == dep_id && t.status == TaskStatus::Succeeded) {
            map.insert(dep.id.clone(), dep.output.clone().unwrap_or(Value::Null));
        }
    }
    serde_json::to_string(&Value::Object(map)).unwrap_or_else(|_| "{}".to_string())
}

fn classify_failure(combined: &str, parsed: &Value) -> FailureKind {
    let lower = combined.to_lowercase();
    let markers = ["429", "rate limit", "too many requests", "quota", "throttle"];
    if markers.iter().any(|m| lower.contains(m)) {
        return FailureKind::RateLimit;
    }
    let code_is_429 = parsed
        .get("code")
        .and_then(value_as_429)
        .or_else(|| parsed.get("status").and_then(value_as_429))
        .unwrap_or(false);
    if code_is_429 {
        FailureKind::RateLimit
    } else {
        FailureKind::General
    }
}

fn value_as_429(v: &Value) -> Option<bool> {
    match v {
        Value::Number(n) => Some(n.as_i64() == Some(429)),
        Value::String(s) => Some(s.trim() == "429"),
        _ => None,
    }
}

/// Parse a `Retry-After`-style hint out of free-form CLI output: either a
/// bare number of seconds/minutes/milliseconds, or an HTTP date.
fn parse_retry_after(text: &str) -> Option<Duration> {
    let lower = text.to_lowercase();
    for marker in ["retry-after", "retry after", "retry in"] {
        if let Some(idx) = lower.find(marker) {
            let rest = &text[idx + marker.len()..];
            if let Some(d) = parse_duration_token(rest) {
                return Some(d);
            }
            if let Some(d) = parse_http_date_token(rest) {
                return Some(d);
            }
        }
    }
    None
}

fn parse_duration_token(rest: &str) -> Option<Duration> {
    let trimmed = rest.trim_start_matches([':', ' ']);
    let num_end = trimmed.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(trimmed.len());
    if num_end == 0 {
        return None;
    }
    let number: f64 = trimmed[..num_end].parse().ok()?;
    let unit_part = trimmed[num_end..].trim_start();
    let unit = unit_part.split(|c: char| !c.is_alphabetic()).next().unwrap_or("");
    let millis = match unit.to_lowercase().as_str() {
        "ms" => number,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => number * 1000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => number * 60_000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis.max(0.0) as u64))
}

fn parse_http_date_token(rest: &str) -> Option<Duration> {
    let candidate = rest.trim_start_matches([':', ' ']);
    let end = candidate.find(['\n', '"']).unwrap_or_else(|| candidate.len().min(40));
    let slice = &candidate[..end];
    let when = chrono::DateTime::parse_from_rfc2822(slice.trim()).ok()?;
    let delta = when.with_timezone(&Utc) - Utc::now();
    if delta.num_milliseconds() <= 0 {
        Some(Duration::ZERO)
    } else {
        Some(Duration::from_millis(delta.num_milliseconds() as u64))
    }
}

fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(20));
    let millis = (base.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(millis.min(max.as_millis() as u64))
}

fn jittered(d: Duration) -> Duration {
    let factor = rand::rng().random_range(0.75..=1.25);
    Duration::from_millis((d.as_millis() as f64 * factor) as u64)
}

fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((i, _)) => s[..i].to_string(),
        None => s.to_string(),
    }
}
