//! `team events` command: tail a job's append-only event log.

use anyhow::Result;

use team_store::config::StateRootConfig;
use team_store::event_log;

pub async fn run_events(state_root: &StateRootConfig, job_id: &str, limit: usize) -> Result<()> {
    let events = event_log::list_recent(state_root, job_id, limit).await?;

    if events.is_empty() {
        println!("No events recorded for job {job_id}.");
        return Ok(());
    }

    for event in &events {
        println!("{} {:<32} {}", event.created_at.format("%Y-%m-%dT%H:%M:%SZ"), event.event_type, event.message);
        if let Some(payload) = &event.payload {
            println!("    {payload}");
        }
    }

    Ok(())
}
