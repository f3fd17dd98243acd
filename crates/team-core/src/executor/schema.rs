//! Role-specific structured-output validation, approval detection, and
//! mailbox message extraction from a task's parsed JSON output.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use team_store::models::{Addressee, MailboxKind, MailboxMessage, Role, TeamTask};

/// One planner-emitted sub-task, before it's assigned a slot in the run.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PlannerOutput {
    pub plan_summary: String,
    pub tasks: Vec<PlannedTask>,
}

/// A role's structured output failed schema validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

/// Validate and parse a `planner` role's structured output: a non-empty
/// `plan_summary`, a non-empty `tasks` array with valid roles, no
/// duplicate or dangling-dependency ids, and an acyclic dependency graph.
pub fn parse_planner_output(parsed: &Value) -> Result<PlannerOutput, SchemaError> {
    let plan_summary = parsed
        .get("plan_summary")
        .or_else(|| parsed.get("planSummary"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SchemaError("planner output missing non-empty plan_summary".to_string()))?
        .to_string();

    let raw_tasks = parsed
        .get("tasks")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SchemaError("planner output missing non-empty tasks array".to_string()))?;

    let mut tasks = Vec::with_capacity(raw_tasks.len());
    let mut seen_ids = HashSet::new();

    for (i, raw) in raw_tasks.iter().enumerate() {
        let role_str = raw
            .get("role")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError(format!("planner task {i} missing role")))?;
        let role: Role =
            role_str.parse().map_err(|_| SchemaError(format!("planner task {i} has invalid role {role_str:?}")))?;

        let name = raw
            .get("subject")
            .or_else(|| raw.get("description"))
            .or_else(|| raw.get("name"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SchemaError(format!("planner task {i} missing subject/description/name")))?
            .to_string();

        let id = raw.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_else(|| format!("{role}-{i}"));
        if !seen_ids.insert(id.clone()) {
            return Err(SchemaError(format!("duplicate planner task id {id:?}")));
        }

        tasks.push(PlannedTask { id, name, role, dependencies: extract_dependencies(raw) });
    }

    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    for t in &tasks {
        for dep in &t.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(SchemaError(format!("task {:?} depends on unknown task {dep:?}", t.id)));
            }
        }
    }

    if has_cycle(&tasks) {
        return Err(SchemaError("planner output dependency graph contains a cycle".to_string()));
    }

    Ok(PlannerOutput { plan_summary, tasks })
}

fn extract_dependencies(raw: &Value) -> Vec<String> {
    match raw.get("depends_on").or_else(|| raw.get("dependsOn")).or_else(|| raw.get("dependencies")) {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(arr)) => arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect(),
        _ => Vec::new(),
    }
}

fn has_cycle(tasks: &[PlannedTask]) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    let deps: HashMap<&str, &[String]> = tasks.iter().map(|t| (t.id.as_str(), t.dependencies.as_slice())).collect();
    let mut marks: HashMap<&str, Mark> = tasks.iter().map(|t| (t.id.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(id: &'a str, deps: &HashMap<&'a str, &'a [String]>, marks: &mut HashMap<&'a str, Mark>) -> bool {
        match marks.get(id).copied() {
            Some(Mark::Visiting) => return true,
            Some(Mark::Done) => return false,
            _ => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(dep_ids) = deps.get(id) {
            for dep in dep_ids.iter() {
                if visit(dep.as_str(), deps, marks) {
                    return true;
                }
            }
        }
        marks.insert(id, Mark::Done);
        false
    }

    tasks.iter().any(|t| visit(&t.id, &deps, &mut marks))
}

/// Validate a `verifier` role's structured output: `status` must be
/// exactly `pass` or `fail`.
pub fn validate_verifier_output(parsed: &Value) -> Result<(), SchemaError> {
    match parsed.get("status").and_then(|v| v.as_str()) {
        Some("pass") => Ok(()),
        Some("fail") => Err(SchemaError("verifier reported status=fail".to_string())),
        _ => Err(SchemaError("verifier output missing status=pass|fail".to_string())),
    }
}

/// Does `parsed` request human approval before the run continues?
pub fn requires_approval(parsed: &Value) -> bool {
    let direct =
        parsed.get("requiresApproval").or_else(|| parsed.get("requires_approval")).or_else(|| parsed.get("requireApproval"));
    if direct.is_some_and(is_truthy) {
        return true;
    }
    parsed.get("approval").and_then(|a| a.get("required")).is_some_and(is_truthy)
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        Value::String(s) => matches!(s.to_lowercase().as_str(), "1" | "yes" | "y" | "true"),
        _ => false,
    }
}

/// Pull mailbox entries out of `parsed`, normalizing each into a message
/// sent on behalf of `task`. Entries with an unrecognized `kind` or empty
/// `message` are silently dropped.
pub fn extract_mailbox(parsed: &Value, task: &TeamTask, now: DateTime<Utc>) -> Vec<MailboxMessage> {
    let raw = match parsed.get("mailbox") {
        Some(Value::Array(arr)) => arr.clone(),
        Some(v @ Value::Object(_)) => vec![v.clone()],
        _ => return Vec::new(),
    };

    raw.into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let kind_str = entry.get("kind").and_then(|v| v.as_str())?;
            let kind: MailboxKind = kind_str.parse().ok()?;
            let message = entry.get("message").and_then(|v| v.as_str())?.to_string();
            if message.trim().is_empty() {
                return None;
            }

            let id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("task-output-{}-{}-{}", task.id, i, now.timestamp_millis()));
            let to = entry.get("to").and_then(parse_addressee).unwrap_or(Addressee::Role(task.role));
            let task_id = entry
                .get("taskId")
                .or_else(|| entry.get("task_id"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .or_else(|| Some(task.id.clone()));
            let payload = entry.get("payload").cloned().unwrap_or(Value::Null);
            let meta = entry.get("meta").cloned().unwrap_or(Value::Null);

            Some(MailboxMessage {
                id,
                kind,
                to: Some(to),
                task_id,
                message,
                payload,
                created_at: now,
                delivered_at: None,
                delivered: false,
                meta,
            })
        })
        .collect()
}

fn parse_addressee(v: &Value) -> Option<Addressee> {
    match v {
        Value::String(s) if s == "leader" => Some(Addressee::Leader),
        Value::String(s) => s.parse::<Role>().ok().map(Addressee::Role),
        Value::Array(arr) => {
            let roles: Vec<Role> = arr.iter().filter_map(|v| v.as_str().and_then(|s| s.parse().ok())).collect();
            if roles.is_empty() {
                None
            } else {
                Some(Addressee::Roles(roles))
            }
        }
        _ => None,
    }
}
