//! Execution audit trail and running statistics.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// Executions kept per rule; the oldest entry is evicted first.
pub const HISTORY_CAPACITY: usize = 100;

/// What started an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ExecutionTrigger {
    Schedule,
    Event { event: String },
    Manual { requested_by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trigger: ExecutionTrigger,
    pub success: bool,
    /// Items whose conditions matched and whose actions ran.
    pub affected_items: u32,
    pub failed_items: u32,
    pub details: String,
    pub error: Option<String>,
    /// Failed before any item was processed (gate, missing data).
    pub aborted: bool,
}

impl ExecutionRecord {
    pub fn aborted(
        trigger: ExecutionTrigger,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let error = error.into();
        Self {
            started_at: at,
            finished_at: at,
            trigger,
            success: false,
            affected_items: 0,
            failed_items: 0,
            details: format!("execution aborted: {error}"),
            error: Some(error),
            aborted: true,
        }
    }

    /// Counts toward execution limits and cooldown.
    pub fn counts_as_run(&self) -> bool {
        !self.aborted
    }
}

/// Bounded, time-ordered execution history.
///
/// Start times of completed runs are kept apart from the capped entries, for the
/// current UTC day, so that limit windows never lose runs to eviction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionHistory {
    entries: VecDeque<ExecutionRecord>,
    #[serde(default)]
    run_starts: VecDeque<DateTime<Utc>>,
}

impl ExecutionHistory {
    pub fn push(&mut self, record: ExecutionRecord) {
        if record.counts_as_run() {
            let day_start = record
                .started_at
                .duration_trunc(Duration::days(1))
                .unwrap_or(record.started_at);
            while self.run_starts.front().is_some_and(|t| *t < day_start) {
                self.run_starts.pop_front();
            }
            self.run_starts.push_back(record.started_at);
        }
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ExecutionRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ExecutionRecord> {
        self.entries.back()
    }

    /// Completed runs started at or after `since`, for `since` no earlier than the
    /// start of the latest run's UTC day.
    pub fn runs_since(&self, since: DateTime<Utc>) -> usize {
        self.run_starts.iter().rev().take_while(|t| **t >= since).count()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub execution_count: u64,
    pub success_count: u64,
    /// `success_count / execution_count`, in `[0, 1]`.
    pub success_rate: f64,
    pub last_executed: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl RuleStats {
    pub fn record(&mut self, record: &ExecutionRecord) {
        self.execution_count += 1;
        if record.success {
            self.success_count += 1;
            self.last_success = Some(record.finished_at);
        } else {
            self.last_failure = Some(record.finished_at);
            self.last_error = record.error.clone();
        }
        self.success_rate = self.success_count as f64 / self.execution_count as f64;
        if record.counts_as_run() {
            self.last_executed = Some(record.started_at);
        }
    }
}
