//! Background job system with retry, backoff, timeouts and dead-letter handling.
//!
//! Deferred rule actions (secondary actions with a delay) are enqueued here as
//! `rule_action.<kind>` jobs and run by a [`JobExecutor`] once due.
//!
//! - `Job`: tenant-scoped unit of work with payload, retry policy and timeout
//! - `JobStore`: persistence (in-memory for tests/dev)
//! - `JobExecutor`: runs claimed jobs, retries with backoff, dead-letters

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus,
    RULE_ACTION_PREFIX, RetryPolicy,
};
