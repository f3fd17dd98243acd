mod action_cmd;
mod config;
mod events_cmd;
mod mailbox_cmd;
mod status_cmd;
mod submit_cmd;
mod worker_cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};

use team_store::models::{MailboxKind, Provider};

#[derive(Parser)]
#[command(name = "team", about = "Filesystem-backed team-mode job orchestrator")]
struct Cli {
    /// State root directory (overrides OMX_STATE_ROOT / config file)
    #[arg(long, global = true)]
    state_root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a team config file (no job store required)
    Init {
        /// Default state root directory to record in the config file
        #[arg(long)]
        state_root: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Submit a new team-mode job
    Submit {
        /// Agent CLI flavor: codex, claude, or gemini
        #[arg(long, default_value = "claude")]
        provider: Provider,
        /// Repository identifier
        #[arg(long, default_value = "unknown")]
        repo: String,
        /// Git ref to operate on
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
        /// Free-form task description handed to the planner
        #[arg(long)]
        task: String,
        /// Pause for operator approval when a role requests it
        #[arg(long)]
        require_approval: bool,
        /// Maximum concurrent task executions per batch
        #[arg(long)]
        parallel_tasks: Option<usize>,
        /// Whole-graph retries after a task fails terminally
        #[arg(long)]
        max_fix_attempts: Option<u32>,
    },
    /// Run the job dispatcher loop: claim jobs off the queue and drive them
    Worker {
        /// Worker identity recorded on task claims (defaults to a random id)
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Show job and team-run status (omit job-id to list all jobs)
    Status {
        /// Job ID to show status for (omit to list all jobs)
        job_id: Option<String>,
    },
    /// Approve the task currently awaiting operator approval
    Approve {
        /// Job ID to approve
        job_id: String,
    },
    /// Reject the task currently awaiting operator approval
    Reject {
        /// Job ID to reject
        job_id: String,
    },
    /// Cancel a non-terminal job
    Cancel {
        /// Job ID to cancel
        job_id: String,
    },
    /// Re-queue a terminal job from its preserved options
    Resume {
        /// Job ID to resume
        job_id: String,
    },
    /// Post a mailbox message into a job's team run
    Mailbox {
        #[command(subcommand)]
        command: MailboxCommands,
    },
    /// Tail a job's append-only event log
    Events {
        /// Job ID to show events for
        job_id: String,
        /// Maximum number of recent events to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a shell completion script
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MailboxCommands {
    /// Send a mailbox message
    Send {
        /// Job ID to post the message to
        job_id: String,
        /// Message kind: question, instruction, notice, or reassign
        #[arg(long)]
        kind: MailboxKind,
        /// Addressee: "leader", a role name, or a comma-separated role list
        #[arg(long)]
        to: Option<String>,
        /// Task ID this message concerns (required for `reassign`)
        #[arg(long)]
        task_id: Option<String>,
        /// Message text
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { state_root, force } => {
            let path = config::config_path();
            if path.exists() && !force {
                anyhow::bail!("config file already exists at {}\nUse --force to overwrite.", path.display());
            }
            let cfg = config::ConfigFile { state_root, default_provider: None };
            config::save_config(&cfg)?;
            println!("Config written to {}", path.display());
        }
        Commands::Submit { provider, repo, git_ref, task, require_approval, parallel_tasks, max_fix_attempts } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            submit_cmd::run_submit(
                &state_root,
                provider,
                repo,
                git_ref,
                task,
                require_approval,
                parallel_tasks,
                max_fix_attempts,
            )
            .await?;
        }
        Commands::Worker { worker_id } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            let worker_id = worker_id.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));
            worker_cmd::run_worker(&state_root, worker_id).await?;
        }
        Commands::Status { job_id } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            let result = status_cmd::run_status(&state_root, job_id.as_deref()).await;
            if let Err(err) = &result {
                eprintln!("{err:#}");
                std::process::exit(1);
            }
        }
        Commands::Approve { job_id } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            action_cmd::run_approve(&state_root, &job_id).await?;
        }
        Commands::Reject { job_id } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            action_cmd::run_reject(&state_root, &job_id).await?;
        }
        Commands::Cancel { job_id } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            action_cmd::run_cancel(&state_root, &job_id).await?;
        }
        Commands::Resume { job_id } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            action_cmd::run_resume(&state_root, &job_id).await?;
        }
        Commands::Mailbox { command } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            let MailboxCommands::Send { job_id, kind, to, task_id, message } = command;
            mailbox_cmd::run_mailbox_send(&state_root, &job_id, kind, to, task_id, message).await?;
        }
        Commands::Events { job_id, limit } => {
            let state_root = config::resolve_state_root(cli.state_root.as_deref());
            events_cmd::run_events(&state_root, &job_id, limit).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}
