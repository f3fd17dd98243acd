//! On-disk data model for jobs, team runs, tasks, mailbox messages, and
//! events.
//!
//! Every status/kind enum mirrors the closed vocabularies in the
//! specification and carries `Display`/`FromStr` impls so callers can coerce
//! unknown values read off disk instead of hard-failing (see
//! [`crate::job_store::read`]).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Provider / Mode
// ---------------------------------------------------------------------------

/// Agent CLI flavor a job is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Codex,
    Claude,
    Gemini,
}

impl Provider {
    /// Default binary name used to invoke this provider's CLI.
    pub fn default_binary(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        };
        f.write_str(s)
    }
}

impl FromStr for Provider {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            other => Err(ParseEnumError::new("provider", other)),
        }
    }
}

/// Run mode. Only [`Mode::Team`] is handled by this core; the others pass
/// through to a separate runner that is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Autopilot,
    Team,
    Ralph,
    Ultrawork,
    Pipeline,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Autopilot => "autopilot",
            Self::Team => "team",
            Self::Ralph => "ralph",
            Self::Ultrawork => "ultrawork",
            Self::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autopilot" => Ok(Self::Autopilot),
            "team" => Ok(Self::Team),
            "ralph" => Ok(Self::Ralph),
            "ultrawork" => Ok(Self::Ultrawork),
            "pipeline" => Ok(Self::Pipeline),
            other => Err(ParseEnumError::new("mode", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Job lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status shared by jobs and team runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    WaitingApproval,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// A terminal status never transitions again (though `options` may
    /// still be amended, e.g. by a later mailbox send).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::WaitingApproval => "waiting_approval",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "waiting_approval" => Ok(Self::WaitingApproval),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

/// Approval gate state for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    None,
    Required,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Required => "required",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl FromStr for ApprovalState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError::new("approval state", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Team task role / status
// ---------------------------------------------------------------------------

/// Role a sub-task plays in the team DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Researcher,
    Designer,
    Developer,
    Executor,
    Verifier,
}

impl Role {
    /// The scheduler's tiebreaker order: planner-like work is preferred
    /// when capacity is scarce.
    pub const ORDER: [Role; 6] = [
        Role::Planner,
        Role::Researcher,
        Role::Designer,
        Role::Developer,
        Role::Executor,
        Role::Verifier,
    ];

    /// Position in [`Role::ORDER`], used as a sort key.
    pub fn rank(self) -> usize {
        Self::ORDER.iter().position(|r| *r == self).unwrap_or(Self::ORDER.len())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planner => "planner",
            Self::Researcher => "researcher",
            Self::Designer => "designer",
            Self::Developer => "developer",
            Self::Executor => "executor",
            Self::Verifier => "verifier",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planner" => Ok(Self::Planner),
            "researcher" => Ok(Self::Researcher),
            "designer" => Ok(Self::Designer),
            "developer" => Ok(Self::Developer),
            "executor" => Ok(Self::Executor),
            "verifier" => Ok(Self::Verifier),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// Status of a single team task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Blocked,
    Canceled,
}

impl TaskStatus {
    /// A dead-end status can never become runnable again on its own.
    pub fn is_dead_end(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            "canceled" => Ok(Self::Canceled),
            other => Err(ParseEnumError::new("task status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Mailbox message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxKind {
    Question,
    Instruction,
    Notice,
    Reassign,
}

impl fmt::Display for MailboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Question => "question",
            Self::Instruction => "instruction",
            Self::Notice => "notice",
            Self::Reassign => "reassign",
        };
        f.write_str(s)
    }
}

impl FromStr for MailboxKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(Self::Question),
            "instruction" => Ok(Self::Instruction),
            "notice" => Ok(Self::Notice),
            "reassign" => Ok(Self::Reassign),
            other => Err(ParseEnumError::new("mailbox kind", other)),
        }
    }
}

/// Who a mailbox message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Addressee {
    Leader,
    Role(Role),
    Roles(Vec<Role>),
}

/// A single mailbox entry.
///
/// Append-only except for `delivered`/`delivered_at`, which flip exactly
/// once on first delivery (see [`crate::models::MailboxMessage::mark_delivered`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub id: String,
    pub kind: MailboxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Addressee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl MailboxMessage {
    /// Mark the message delivered, setting `delivered_at` only the first
    /// time this is called.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) {
        if !self.delivered {
            self.delivered = true;
            self.delivered_at = Some(now);
        }
    }
}

// ---------------------------------------------------------------------------
// Team task
// ---------------------------------------------------------------------------

/// A single DAG node in a team run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamTask {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub requires_approval: bool,
}

impl TeamTask {
    /// A task is running iff it holds a live, unexpired claim.
    pub fn is_claimed(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Running
            && self.worker_id.is_some()
            && self.claim_token.is_some()
            && self.claim_expires_at.is_some_and(|exp| exp > now)
    }

    /// Clear every claim-related field (used on reclaim and reassignment).
    pub fn clear_claim(&mut self) {
        self.worker_id = None;
        self.claim_token = None;
        self.claim_expires_at = None;
        self.last_heartbeat_at = None;
    }
}

// ---------------------------------------------------------------------------
// Metrics (derived, recomputed on every persist)
// ---------------------------------------------------------------------------

/// Derived counters recomputed whenever the team state is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub canceled: usize,
    pub active_workers: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_task_duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_task_duration_ms: Option<i64>,
}

impl TeamMetrics {
    /// Recompute every counter from scratch against the given task list.
    pub fn recompute(tasks: &[TeamTask]) -> Self {
        let mut m = TeamMetrics::default();
        let mut workers = std::collections::HashSet::new();
        let mut durations: Vec<i64> = Vec::new();

        for t in tasks {
            match t.status {
                TaskStatus::Queued => m.queued += 1,
                TaskStatus::Running => m.running += 1,
                TaskStatus::Succeeded => m.succeeded += 1,
                TaskStatus::Failed => m.failed += 1,
                TaskStatus::Blocked => m.blocked += 1,
                TaskStatus::Canceled => m.canceled += 1,
            }
            if t.status == TaskStatus::Running {
                if let Some(w) = &t.worker_id {
                    workers.insert(w.clone());
                }
            }
            if let (Some(start), Some(finish)) = (t.started_at, t.finished_at) {
                durations.push((finish - start).num_milliseconds().max(0));
            }
            if let Some(output) = &t.output {
                if let Some(usage) = output.get("tokenUsage").or_else(|| output.get("usage")) {
                    m.input_tokens += usage
                        .get("inputTokens")
                        .or_else(|| usage.get("input_tokens"))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    m.output_tokens += usage
                        .get("outputTokens")
                        .or_else(|| usage.get("output_tokens"))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                }
            }
        }

        m.active_workers = workers.len();
        if !durations.is_empty() {
            let sum: i64 = durations.iter().sum();
            m.avg_task_duration_ms = Some(sum as f64 / durations.len() as f64);
            m.max_task_duration_ms = durations.into_iter().max();
        }

        m
    }
}

// ---------------------------------------------------------------------------
// Team run state
// ---------------------------------------------------------------------------

/// The nested team run state carried inside a job's options bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamState {
    pub status: JobStatus,
    #[serde(default = "default_phase")]
    pub phase: String,
    #[serde(default)]
    pub fix_attempts: u32,
    pub max_fix_attempts: u32,
    pub parallel_tasks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TeamTask>,
    #[serde(default)]
    pub mailbox: Vec<MailboxMessage>,
    #[serde(default)]
    pub metrics: TeamMetrics,
}

fn default_phase() -> String {
    "blocked".to_string()
}

impl TeamState {
    /// A freshly-created team run before any tasks are known.
    pub fn new(parallel_tasks: usize, max_fix_attempts: u32) -> Self {
        Self {
            status: JobStatus::Queued,
            phase: default_phase(),
            fix_attempts: 0,
            max_fix_attempts,
            parallel_tasks: parallel_tasks.max(1),
            approval_task_id: None,
            current_task_id: None,
            tasks: Vec::new(),
            mailbox: Vec::new(),
            metrics: TeamMetrics::default(),
        }
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut TeamTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&TeamTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

// ---------------------------------------------------------------------------
// Job options / record
// ---------------------------------------------------------------------------

/// A caller-supplied template for one task in the initial team plan,
/// accepted via the `team.teamTasks` option. Falls back to the built-in
/// six-role serial plan when the caller doesn't supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamTaskTemplate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// The options bag carried on a job record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "team.state")]
    pub team_state: Option<TeamState>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "team.parallelTasks")]
    pub team_parallel_tasks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "team.maxFixAttempts")]
    pub team_max_fix_attempts: Option<u32>,
    #[serde(default, rename = "team.tmuxVisualization")]
    pub team_tmux_visualization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "team.teamTasks")]
    pub team_tasks_template: Option<Vec<TeamTaskTemplate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_tmux_session: Option<bool>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub agent_commands: HashMap<String, String>,
}

/// The durable job record: one per job, the single source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub provider: Provider,
    pub mode: Mode,
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub task: String,
    #[serde(default)]
    pub options: JobOptions,
    pub status: JobStatus,
    pub approval_state: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// Input accepted by [`crate::job_store::create`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub provider: Provider,
    pub mode: Mode,
    pub repo: String,
    pub git_ref: String,
    pub task: String,
    pub options: JobOptions,
    pub require_approval: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The closed vocabulary of event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Queued,
    PhaseChanged,
    ApprovalRequired,
    Approval,
    Canceled,
    Completed,
    Failed,
    Log,
    TmuxSessionStarted,
    TmuxSessionClosed,
    TmuxSessionRetained,
    WaitingApproval,
    #[serde(rename = "team.task.started")]
    TeamTaskStarted,
    #[serde(rename = "team.task.validation_failed")]
    TeamTaskValidationFailed,
    #[serde(rename = "team.task.approval_required")]
    TeamTaskApprovalRequired,
    #[serde(rename = "team.task.retry")]
    TeamTaskRetry,
    #[serde(rename = "team.task.completed")]
    TeamTaskCompleted,
    #[serde(rename = "team.task.reassigned")]
    TeamTaskReassigned,
    #[serde(rename = "team.task.non_reporting")]
    TeamTaskNonReporting,
    #[serde(rename = "team.claim_recovered")]
    TeamClaimRecovered,
    #[serde(rename = "team.mailbox.question")]
    TeamMailboxQuestion,
    #[serde(rename = "team.mailbox.instruction")]
    TeamMailboxInstruction,
    #[serde(rename = "team.mailbox.notice")]
    TeamMailboxNotice,
    #[serde(rename = "team.mailbox.received")]
    TeamMailboxReceived,
    #[serde(rename = "team.retry")]
    TeamRetry,
    #[serde(rename = "team.blocked")]
    TeamBlocked,
    #[serde(rename = "team.waiting_approval")]
    TeamWaitingApproval,
    #[serde(rename = "team.completed")]
    TeamCompleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        match v.as_str() {
            Some(s) => f.write_str(s),
            None => f.write_str("unknown"),
        }
    }
}

/// One append-only event log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default = "default_event_version")]
    pub v: u32,
    pub id: String,
    pub job_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_event_version() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Parse error
// ---------------------------------------------------------------------------

/// Error returned when parsing any of this module's string-backed enums.
#[derive(Debug, Clone)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_owned() }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_display_and_from_str() {
        for s in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::WaitingApproval,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Canceled,
        ] {
            let rendered = s.to_string();
            assert_eq!(rendered.parse::<JobStatus>().unwrap(), s);
        }
    }

    #[test]
    fn job_status_terminal_set() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::WaitingApproval.is_terminal());
    }

    #[test]
    fn role_rank_matches_scheduler_order() {
        assert_eq!(Role::Planner.rank(), 0);
        assert_eq!(Role::Verifier.rank(), 5);
        assert!(Role::Researcher.rank() < Role::Developer.rank());
    }

    #[test]
    fn unknown_role_string_is_rejected() {
        assert!("wizard".parse::<Role>().is_err());
    }

    #[test]
    fn event_type_serializes_to_dotted_string() {
        let v = serde_json::to_value(EventType::TeamTaskNonReporting).unwrap();
        assert_eq!(v.as_str(), Some("team.task.non_reporting"));
    }

    #[test]
    fn metrics_recompute_counts_by_status() {
        let tasks = vec![
            sample_task("a", TaskStatus::Queued),
            sample_task("b", TaskStatus::Running),
            sample_task("c", TaskStatus::Blocked),
        ];
        let metrics = TeamMetrics::recompute(&tasks);
        assert_eq!(metrics.queued, 1);
        assert_eq!(metrics.running, 1);
        assert_eq!(metrics.blocked, 1);
    }

    fn sample_task(id: &str, status: TaskStatus) -> TeamTask {
        TeamTask {
            id: id.to_string(),
            name: id.to_string(),
            role: Role::Executor,
            dependencies: vec![],
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
}
