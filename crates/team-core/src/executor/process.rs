//! Command resolution and Agent CLI subprocess invocation.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use team_store::models::{JobOptions, JobRecord, Provider, Role, TeamTask};

/// Utilities that are run directly through a shell rather than wrapped in
/// `<binary> exec --json ...` — anything a role's command template might
/// reasonably invoke on its own.
const SHELL_UTILITIES: &[&str] =
    &["bash", "sh", "echo", "git", "node", "npm", "npx", "yarn", "pnpm", "bun", "python", "python3", "tmux"];

/// Result of running the Agent CLI subprocess once.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Resolve the command template for `role`, following the precedence:
/// explicit per-role override in job options -> `JOB_<PROVIDER>_<ROLE>_CMD`
/// -> `JOB_<ROLE>_CMD` -> a built-in default prompt template.
pub fn resolve_command_template(provider: Provider, role: Role, options: &JobOptions) -> String {
    let role_key = role.to_string();
    if let Some(cmd) = options.agent_commands.get(&role_key) {
        return cmd.clone();
    }
    let provider_key = format!("JOB_{}_{}_CMD", provider.to_string().to_uppercase(), role_key.to_uppercase());
    if let Ok(cmd) = std::env::var(&provider_key) {
        return cmd;
    }
    let role_only_key = format!("JOB_{}_CMD", role_key.to_uppercase());
    if let Ok(cmd) = std::env::var(&role_only_key) {
        return cmd;
    }
    default_template(role)
}

fn default_template(role: Role) -> String {
    match role {
        Role::Planner => "{PROVIDER} plan --task \"{TASK}\" --format json".to_string(),
        Role::Researcher => "{PROVIDER} research --task \"{TASK}\" --format json".to_string(),
        Role::Designer => "{PROVIDER} design --task \"{TASK}\" --format json".to_string(),
        Role::Developer => "{PROVIDER} implement --task \"{TASK}\" --format json".to_string(),
        Role::Executor => "{PROVIDER} exec --task \"{TASK}\" --format json".to_string(),
        Role::Verifier => "{PROVIDER} verify --task \"{TASK}\" --format json".to_string(),
    }
}

/// True if `command`'s first whitespace-delimited token names a known
/// shell utility or the CLI binary itself, in which case it should run
/// through `sh -lc` rather than being wrapped in `<binary> exec`.
pub fn is_shell_command(command: &str, binary: &str) -> bool {
    let Some(first) = command.split_whitespace().next() else { return false };
    SHELL_UTILITIES.contains(&first) || first == binary
}

/// Resolve the CLI binary name for `provider`, honoring
/// `JOB_<PROVIDER>_CLI_BIN` then `JOB_CLI_BIN` before falling back to the
/// provider's built-in default.
pub fn binary_for(provider: Provider) -> String {
    let provider_key = format!("JOB_{}_CLI_BIN", provider.to_string().to_uppercase());
    std::env::var(&provider_key)
        .or_else(|_| std::env::var("JOB_CLI_BIN"))
        .unwrap_or_else(|_| provider.default_binary().to_string())
}

/// Build the token table available to [`super::template::render`] for one
/// task attempt.
pub fn build_tokens<'a>(
    job: &JobRecord,
    task: &TeamTask,
    phase: &str,
    workdir: &str,
    dependency_outputs: &str,
) -> HashMap<&'a str, String> {
    let mut tokens = HashMap::new();
    tokens.insert("JOB_ID", job.id.clone());
    tokens.insert("PROVIDER", job.provider.to_string());
    tokens.insert("MODE", job.mode.to_string());
    tokens.insert("REPO", job.repo.clone());
    tokens.insert("REF", job.git_ref.clone());
    tokens.insert("ROLE", task.role.to_string());
    tokens.insert("TASK", format!("{}: {}", task.name, job.task));
    tokens.insert("TASK_ID", task.id.clone());
    tokens.insert("PHASE", phase.to_string());
    tokens.insert("ATTEMPT", task.attempt.to_string());
    tokens.insert("WORKDIR", workdir.to_string());
    tokens.insert("DEPENDENCY_OUTPUTS", dependency_outputs.to_string());
    tokens
}

/// Render and run `command` for one attempt, returning its combined
/// process output. Times out after `timeout`, sending `SIGTERM` first and
/// `SIGKILL` if the child hasn't exited within a short grace period —
/// mirrors how the Agent CLI harnesses in this codebase tear down a
/// runaway child.
pub async fn run_command(
    command: &str,
    binary: &str,
    workdir: &std::path::Path,
    timeout: Duration,
) -> std::io::Result<ProcessOutput> {
    let mut cmd = if is_shell_command(command, binary) {
        let mut c = tokio::process::Command::new("sh");
        c.arg("-lc").arg(command);
        c
    } else {
        let mut c = tokio::process::Command::new(binary);
        c.arg("exec")
            .arg("--json")
            .arg("--full-auto")
            .arg("--skip-git-repo-check")
            .arg("--cd")
            .arg(workdir)
            .arg(command);
        c
    };
    cmd.current_dir(workdir);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(s) = stdout.as_mut() {
            let _ = tokio::io::AsyncReadExt::read_to_end(s, &mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(s) = stderr.as_mut() {
            let _ = tokio::io::AsyncReadExt::read_to_end(s, &mut buf).await;
        }
        buf
    });

    let exit_code = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?.code().unwrap_or(-1),
        Err(_elapsed) => {
            terminate_gracefully(&mut child).await;
            -1
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(ProcessOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
    })
}

#[cfg(unix)]
async fn terminate_gracefully(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    let grace = Duration::from_secs(5);
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate_gracefully(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}
