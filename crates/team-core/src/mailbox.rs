//! Mailbox normalization, ordering, and at-most-once delivery.

use chrono::{DateTime, Utc};

use team_store::models::{Addressee, MailboxKind, MailboxMessage, TaskStatus, TeamState};

use crate::scheduler;

/// Drop malformed entries (empty message text) and sort the remaining ones
/// ascending by `created_at`, so delivery always happens oldest-first.
pub fn normalize(messages: &mut Vec<MailboxMessage>) {
    messages.retain(|m| !m.message.trim().is_empty());
    messages.sort_by_key(|m| m.created_at);
}

/// What happened when one undelivered message was handled, used to drive
/// event emission.
#[derive(Debug, Clone)]
pub enum DeliveryEffect {
    Reassigned { task_id: String },
    ReassignNoMatch,
    Handled(MailboxKind),
}

/// Normalize the mailbox, then deliver every undelivered message exactly
/// once: `reassign` mutates its target task, everything else is left for
/// the caller to turn into an event. Returns effects in delivery order.
pub fn deliver(state: &mut TeamState, now: DateTime<Utc>) -> Vec<DeliveryEffect> {
    normalize(&mut state.mailbox);

    let undelivered_ids: Vec<String> =
        state.mailbox.iter().filter(|m| !m.delivered).map(|m| m.id.clone()).collect();

    let mut effects = Vec::with_capacity(undelivered_ids.len());

    for id in &undelivered_ids {
        let Some(msg) = state.mailbox.iter().find(|m| &m.id == id) else { continue };
        let kind = msg.kind;
        let task_id = msg.task_id.clone();
        let text = msg.message.clone();

        match kind {
            MailboxKind::Reassign => match task_id.as_deref().and_then(|tid| state.task(tid)) {
                Some(_) => {
                    let task_id = task_id.unwrap();
                    let snapshot = state.tasks.clone();
                    if let Some(task) = state.task_mut(&task_id) {
                        let ready = scheduler::deps_satisfied(task, &snapshot);
                        task.clear_claim();
                        task.attempt = 0;
                        task.error = Some(format!("Task re-assigned by mail instruction: {text}"));
                        task.status = if ready { TaskStatus::Queued } else { TaskStatus::Blocked };
                    }
                    effects.push(DeliveryEffect::Reassigned { task_id });
                }
                None => effects.push(DeliveryEffect::ReassignNoMatch),
            },
            other => effects.push(DeliveryEffect::Handled(other)),
        }
    }

    for msg in state.mailbox.iter_mut() {
        if undelivered_ids.contains(&msg.id) {
            msg.mark_delivered(now);
        }
    }

    effects
}

/// Resolve a single `Addressee` into the set of roles it matches, treating
/// `Leader` as matching none of the per-role workers (the leader is the
/// engine loop itself, not a role executor).
pub fn matches_role(to: &Addressee, role: team_store::models::Role) -> bool {
    match to {
        Addressee::Leader => false,
        Addressee::Role(r) => *r == role,
        Addressee::Roles(roles) => roles.contains(&role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use team_store::models::Role;

    fn msg(id: &str, kind: MailboxKind, task_id: Option<&str>, created_at: DateTime<Utc>) -> MailboxMessage {
        MailboxMessage {
            id: id.to_string(),
            kind,
            to: None,
            task_id: task_id.map(|s| s.to_string()),
            message: "hello".to_string(),
            payload: serde_json::Value::Null,
            created_at,
            delivered_at: None,
            delivered: false,
            meta: serde_json::Value::Null,
        }
    }

    fn task(id: &str, status: TaskStatus) -> team_store::models::TeamTask {
        team_store::models::TeamTask {
            id: id.to_string(),
            name: id.to_string(),
            role: Role::Developer,
            dependencies: vec![],
            max_attempts: 3,
            timeout_seconds: 600,
            status,
            attempt: 2,
            started_at: None,
            finished_at: None,
            worker_id: Some("w".to_string()),
            claim_token: Some("t".to_string()),
            claim_expires_at: None,
            last_heartbeat_at: None,
            error: None,
            output: None,
            requires_approval: false,
        }
    }

    #[test]
    fn normalize_drops_blank_messages_and_sorts_ascending() {
        let now = Utc::now();
        let mut messages = vec![
            msg("b", MailboxKind::Notice, None, now),
            msg("a", MailboxKind::Notice, None, now - chrono::Duration::seconds(5)),
            MailboxMessage { message: "   ".to_string(), ..msg("blank", MailboxKind::Notice, None, now) },
        ];
        normalize(&mut messages);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "a");
        assert_eq!(messages[1].id, "b");
    }

    #[test]
    fn deliver_reassigns_matching_task_and_resets_attempt() {
        let mut state = TeamState::new(1, 1);
        state.tasks.push(task("t1", TaskStatus::Running));
        state.mailbox.push(msg("m1", MailboxKind::Reassign, Some("t1"), Utc::now()));

        let effects = deliver(&mut state, Utc::now());
        assert!(matches!(effects[0], DeliveryEffect::Reassigned { .. }));
        let task = state.task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.attempt, 0);
        assert!(task.worker_id.is_none());
        assert!(state.mailbox[0].delivered);
    }

    #[test]
    fn deliver_is_at_most_once() {
        let mut state = TeamState::new(1, 1);
        state.tasks.push(task("t1", TaskStatus::Running));
        state.mailbox.push(msg("m1", MailboxKind::Reassign, Some("t1"), Utc::now()));

        deliver(&mut state, Utc::now());
        let second = deliver(&mut state, Utc::now());
        assert!(second.is_empty());
    }

    #[test]
    fn deliver_reassign_with_unknown_task_reports_no_match() {
        let mut state = TeamState::new(1, 1);
        state.mailbox.push(msg("m1", MailboxKind::Reassign, Some("missing"), Utc::now()));
        let effects = deliver(&mut state, Utc::now());
        assert!(matches!(effects[0], DeliveryEffect::ReassignNoMatch));
    }
}
