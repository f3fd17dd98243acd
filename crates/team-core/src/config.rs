//! Environment-driven configuration for the claim/lease protocol, the
//! engine's idle backoff, and the role executor's retry policy.

use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Claim TTL, heartbeat cadence, and the thresholds used to detect an
/// expired or non-reporting claim.
#[derive(Debug, Clone)]
pub struct ClaimConfig {
    pub claim_ttl: Duration,
    pub lease_slack: Duration,
    pub heartbeat_interval: Duration,
    pub non_reporting_grace: Duration,
}

impl ClaimConfig {
    pub fn from_env() -> Self {
        let claim_ttl = env_duration_ms("TEAM_TASK_CLAIM_TTL_MS", 60_000);
        let lease_slack = env_duration_ms("TEAM_TASK_CLAIM_LEASE_SLACK_MS", 15_000);
        let heartbeat_interval = env_duration_ms("TEAM_TASK_HEARTBEAT_MS", 10_000);
        let non_reporting_grace = env_duration_ms("TEAM_TASK_NON_REPORTING_GRACE_MS", 30_000);
        Self {
            claim_ttl: claim_ttl.max(Duration::from_secs(15)),
            lease_slack,
            heartbeat_interval,
            non_reporting_grace,
        }
    }

    /// The effective lease length written into `claimExpiresAt`.
    pub fn lease(&self) -> Duration {
        self.claim_ttl + self.lease_slack
    }

    /// Grace window used by both the expiry and non-reporting predicates:
    /// `max(nonReportingGrace, heartbeatInterval * 3)`.
    pub fn effective_grace(&self) -> Duration {
        self.non_reporting_grace.max(self.heartbeat_interval * 3)
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Idle-loop backoff pacing for the team engine.
#[derive(Debug, Clone)]
pub struct IdleBackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub max_idle_iterations: u32,
}

impl IdleBackoffConfig {
    pub fn from_env() -> Self {
        Self {
            base: env_duration_ms("TEAM_IDLE_BACKOFF_BASE_MS", 800),
            max: env_duration_ms("TEAM_IDLE_BACKOFF_MAX_MS", 8_000),
            max_idle_iterations: 600,
        }
    }

    /// Exponential backoff for the given idle iteration count, capped, with
    /// 0.75-1.25x jitter applied by the caller.
    pub fn delay_for(&self, idle_iterations: u32) -> Duration {
        let factor = 2u64.saturating_pow(idle_iterations.min(20));
        let millis = self.base.as_millis() as u64;
        Duration::from_millis(millis.saturating_mul(factor).min(self.max.as_millis() as u64))
    }
}

impl Default for IdleBackoffConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Retry policy parameters for one failure kind (rate-limit or general).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

/// Retry policy for both failure kinds, plus the work queue's stale-claim
/// threshold and the number of concurrent worker slots.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub rate_limit: RetryPolicy,
    pub general: RetryPolicy,
    pub queue_stale_claim: Duration,
    pub worker_concurrency: usize,
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        Self {
            rate_limit: RetryPolicy {
                max_attempts: env_u64("JOB_LLM_RATE_LIMIT_RETRY_MAX_ATTEMPTS", 5) as u32,
                base: env_duration_ms("JOB_LLM_RATE_LIMIT_RETRY_BASE_MS", 2_000),
                max: env_duration_ms("JOB_LLM_RATE_LIMIT_RETRY_MAX_MS", 60_000),
            },
            general: RetryPolicy {
                max_attempts: env_u64("JOB_LLM_RETRY_MAX_ATTEMPTS", 3) as u32,
                base: env_duration_ms("JOB_LLM_RETRY_BASE_MS", 1_000),
                max: env_duration_ms("JOB_LLM_RETRY_MAX_MS", 30_000),
            },
            queue_stale_claim: env_duration_ms("WORK_QUEUE_STALE_CLAIM_MS", 60_000).max(Duration::from_secs(60)),
            worker_concurrency: env_usize("WORKER_CONCURRENCY", 4),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Aggregate engine configuration bundling all of the above.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub claim: ClaimConfig,
    pub idle_backoff: IdleBackoffConfig,
    pub executor: ExecutorConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            claim: ClaimConfig::from_env(),
            idle_backoff: IdleBackoffConfig::from_env(),
            executor: ExecutorConfig::from_env(),
        }
    }
}
