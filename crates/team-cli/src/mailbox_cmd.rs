//! `team mailbox send` command: post a mailbox message into a job's team
//! state for delivery on the engine's next iteration.

use anyhow::{Result, bail};
use chrono::Utc;

use team_store::config::StateRootConfig;
use team_store::models::{Addressee, MailboxKind, MailboxMessage, Mode, Role};
use team_store::job_store;

/// Parse `--to`: `leader`, a single role name, or a comma-separated list of
/// role names.
fn parse_addressee(raw: &str) -> anyhow::Result<Addressee> {
    if raw.eq_ignore_ascii_case("leader") {
        return Ok(Addressee::Leader);
    }
    let roles: Result<Vec<Role>, _> = raw.split(',').map(|s| s.trim().parse::<Role>()).collect();
    let roles = roles.map_err(|e| anyhow::anyhow!("invalid --to value {raw:?}: {e}"))?;
    match roles.as_slice() {
        [single] => Ok(Addressee::Role(*single)),
        _ => Ok(Addressee::Roles(roles)),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run_mailbox_send(
    state_root: &StateRootConfig,
    job_id: &str,
    kind: MailboxKind,
    to: Option<String>,
    task_id: Option<String>,
    message: String,
) -> Result<()> {
    if message.trim().is_empty() {
        bail!("mailbox message text must not be empty");
    }

    let job = job_store::read(state_root, job_id).await?;
    if job.mode != Mode::Team {
        bail!("job {job_id} is mode={} and does not accept mailbox sends (team mode only)", job.mode);
    }

    let addressee = to.as_deref().map(parse_addressee).transpose()?;
    let now = Utc::now();
    let entry = MailboxMessage {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        to: addressee,
        task_id,
        message,
        payload: serde_json::Value::Null,
        created_at: now,
        delivered_at: None,
        delivered: false,
        meta: serde_json::Value::Null,
    };

    job_store::update(state_root, job_id, |r| {
        let state = r.options.team_state.get_or_insert_with(|| {
            team_store::models::TeamState::new(
                r.options.team_parallel_tasks.unwrap_or(1),
                r.options.team_max_fix_attempts.unwrap_or(0),
            )
        });
        state.mailbox.push(entry);
    })
    .await?;

    println!("Posted {kind} message to job {job_id}.");
    Ok(())
}
