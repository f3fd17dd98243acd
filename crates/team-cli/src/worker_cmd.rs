//! `team worker` command: poll the work queue and drive jobs to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use team_core::{EngineConfig, dispatch_one};
use team_store::config::StateRootConfig;
use team_store::queue;

/// How long to sleep between queue polls when nothing is pending.
const POLL_INTERVAL: Duration = Duration::from_millis(400);

pub async fn run_worker(state_root: &StateRootConfig, worker_id: String) -> Result<()> {
    let config = EngineConfig::from_env();

    let reaped = queue::reap_stale(state_root, config.executor.queue_stale_claim).await?;
    if !reaped.is_empty() {
        eprintln!("reclaimed {} stale queue entr{}", reaped.len(), if reaped.len() == 1 { "y" } else { "ies" });
    }

    // First signal requests a graceful stop after the in-flight job
    // reaches its next stopping point; a second signal force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    println!("team worker {worker_id} watching {}", state_root.jobs_root.display());

    loop {
        if cancel.is_cancelled() {
            println!("worker stopped.");
            return Ok(());
        }

        match dispatch_one(state_root, &worker_id, &config, cancel.clone()).await {
            Ok(Some(outcome)) => {
                println!("job finished: {outcome:?}");
            }
            Ok(None) => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(err) => {
                eprintln!("dispatch error: {err}");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
