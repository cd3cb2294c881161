//! Core job types and policies.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockpilot_core::TenantId;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Prefix of every deferred rule action job type.
pub const RULE_ACTION_PREFIX: &str = "rule_action";

/// Job kind/type for routing to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A rule's secondary action, run after its delay.
    RuleAction { job_type: String },
    Custom { kind: String },
}

impl JobKind {
    /// `rule_action.<action kind>`, e.g. `rule_action.send_notification`.
    pub fn rule_action(action_kind: &str) -> Self {
        Self::RuleAction {
            job_type: format!("{RULE_ACTION_PREFIX}.{action_kind}"),
        }
    }

    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    pub fn type_name(&self) -> &str {
        match self {
            JobKind::RuleAction { job_type } => job_type,
            JobKind::Custom { kind } => kind,
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    Running,
    Completed,
    /// Failed, will be retried
    Failed { error: String, attempt: u32 },
    /// Exhausted retries, moved to DLQ
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// base * 2^(attempt - 1)
    #[default]
    Exponential,
    Linear,
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "linear" => Ok(BackoffStrategy::Linear),
            other => Err(format!("unknown backoff strategy '{other}' (expected fixed, linear or exponential)")),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Growing strategies get 10% jitter; fixed delays get none.
    pub fn new(strategy: BackoffStrategy, max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        let (max_delay, jitter) = match strategy {
            BackoffStrategy::Fixed => (base_delay, 0.0),
            BackoffStrategy::Exponential | BackoffStrategy::Linear => (max_delay, 0.1),
        };
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy,
            jitter,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(BackoffStrategy::Fixed, max_attempts, delay, delay)
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(BackoffStrategy::Exponential, max_attempts, base_delay, max_delay)
    }

    pub fn linear(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(BackoffStrategy::Linear, max_attempts, base_delay, max_delay)
    }

    /// Delay before the retry that follows attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * (attempt as f64)).min(max_ms),
        };

        // Deterministic jitter derived from the attempt number.
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Per-attempt limit; an attempt running longer counts as failed.
    pub timeout: Option<Duration>,
    /// Current attempt number (starts at 0)
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not claimable before this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    pub fn new(tenant_id: TenantId, kind: JobKind, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            timeout: None,
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| now >= at)
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.record_attempt(started_at, now, None);
    }

    /// Schedule a retry with backoff, or dead-letter once attempts are exhausted.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.updated_at = now;
        self.record_attempt(started_at, now, Some(error.clone()));

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }

    /// Dead-letter without retrying, whatever attempts remain.
    pub fn mark_abandoned(&mut self, error: String, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.updated_at = now;
        self.record_attempt(started_at, now, Some(error.clone()));
        self.status = JobStatus::DeadLettered {
            error,
            attempts: self.attempt,
        };
    }

    fn record_attempt(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>, error: Option<String>) {
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: error.is_none(),
            error,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Nothing to do any more (e.g. the rule was deactivated). Completes the job.
    Skipped(String),
    Failure(String),
    /// The attempt outlived its timeout and may still finish on its own thread.
    /// Never retried, so a slow non-idempotent action cannot run twice.
    TimedOut(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String, at: DateTime<Utc>) -> Self {
        Self {
            job,
            dead_lettered_at: at,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn linear_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(1),
            strategy: BackoffStrategy::Linear,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(1));
    }

    #[test]
    fn strategy_names_select_the_policy_shape() {
        assert_eq!("Linear".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Linear));
        assert!("random".parse::<BackoffStrategy>().is_err());

        let fixed = RetryPolicy::new(BackoffStrategy::Fixed, 3, Duration::from_secs(30), Duration::from_secs(600));
        assert_eq!(fixed.delay_for_attempt(3), Duration::from_secs(30));

        let linear = RetryPolicy::linear(3, Duration::from_secs(30), Duration::from_secs(600));
        assert_eq!(linear.jitter, 0.1);
        assert!(linear.delay_for_attempt(2) > linear.delay_for_attempt(1));
    }

    #[test]
    fn delayed_job_is_not_ready_early() {
        let job = Job::new(TenantId::new(), JobKind::custom("test"), serde_json::json!({}), t0())
            .scheduled_at(t0() + chrono::Duration::minutes(15));
        assert!(!job.is_ready(t0() + chrono::Duration::minutes(14)));
        assert!(job.is_ready(t0() + chrono::Duration::minutes(15)));
    }

    #[test]
    fn failures_retry_then_dead_letter() {
        let mut job = Job::new(
            TenantId::new(),
            JobKind::rule_action("send_notification"),
            serde_json::json!({}),
            t0(),
        )
        .with_retry_policy(RetryPolicy::fixed(2, Duration::from_secs(30)));
        assert_eq!(job.kind.type_name(), "rule_action.send_notification");

        job.mark_running(t0());
        job.mark_failed("smtp down".to_string(), t0(), t0());
        assert!(matches!(job.status, JobStatus::Failed { attempt: 1, .. }));
        assert_eq!(job.scheduled_at, Some(t0() + chrono::Duration::seconds(30)));

        job.mark_running(t0());
        job.mark_failed("smtp down".to_string(), t0(), t0());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 2, .. }));
        assert_eq!(job.history.len(), 2);
    }
}
