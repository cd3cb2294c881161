//! Job executor with retry, backoff and per-attempt timeouts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use stockpilot_core::{Clock, TenantId};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

pub type JobHandler = Arc<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    /// Thread name and log label.
    pub name: String,
    pub tenant_id: Option<TenantId>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
            tenant_id: None,
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Polls a job store, runs claimed jobs through registered handlers and applies the
/// job's retry policy on failure.
pub struct JobExecutor<S: JobStore> {
    store: S,
    clock: Arc<dyn Clock>,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an exact job type, a `prefix.*` category or `*`.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Arc::new(handler));
    }

    fn get_handler(&self, kind: &JobKind) -> Option<&JobHandler> {
        let type_name = kind.type_name();
        if let Some(h) = self.handlers.get(type_name) {
            return Some(h);
        }

        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*")
                && type_name.starts_with(prefix)
            {
                return Some(handler);
            }
        }

        self.handlers.get("*")
    }

    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || executor_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn job executor thread");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Claim and run every job that is ready now. Returns how many ran.
    pub fn run_ready(&self, tenant_id: Option<TenantId>) -> usize {
        let mut ran = 0;
        loop {
            match self.store.claim_next(tenant_id, self.clock.now()) {
                Ok(Some(mut job)) => {
                    let _ = self.execute_one(&mut job);
                    ran += 1;
                }
                Ok(None) => return ran,
                Err(e) => {
                    error!(error = %e, "failed to claim job");
                    return ran;
                }
            }
        }
    }

    /// Run one claimed job and persist its outcome.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let started = self.clock.now();

        let result = match self.get_handler(&job.kind) {
            Some(handler) => run_with_timeout(handler, job),
            None => JobResult::Failure(format!("no handler for job kind: {}", job.kind.type_name())),
        };

        match result {
            JobResult::Success => {
                job.mark_completed(started, self.clock.now());
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, "job completed");
                Ok(())
            }
            JobResult::Skipped(reason) => {
                job.mark_completed(started, self.clock.now());
                self.store.update(job).map_err(|e| e.to_string())?;
                info!(job_id = %job.id, reason = %reason, "job skipped");
                Ok(())
            }
            JobResult::TimedOut(error) => {
                let now = self.clock.now();
                job.mark_abandoned(error.clone(), started, now);
                self.store.update(job).map_err(|e| e.to_string())?;
                warn!(job_id = %job.id, error = %error, "job timed out; dead-lettered without retry");
                self.store
                    .dead_letter(job.clone(), error.clone(), now)
                    .map_err(|e| e.to_string())?;
                Err(error)
            }
            JobResult::Failure(error) => {
                let now = self.clock.now();
                job.mark_failed(error.clone(), started, now);
                self.store.update(job).map_err(|e| e.to_string())?;

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %error, "job dead-lettered");
                    self.store
                        .dead_letter(job.clone(), error.clone(), now)
                        .map_err(|e| e.to_string())?;
                }
                Err(error)
            }
        }
    }
}

/// Run the handler inline, or on a helper thread when the job carries a timeout.
///
/// A timed-out attempt is reported as [`JobResult::TimedOut`]; its thread is left to
/// finish on its own.
fn run_with_timeout(handler: &JobHandler, job: &Job) -> JobResult {
    let Some(timeout) = job.timeout else {
        return handler(job);
    };

    let (tx, rx) = mpsc::channel();
    let handler = handler.clone();
    let attempt = job.clone();
    let spawned = thread::Builder::new()
        .name(format!("job-{}", job.id))
        .spawn(move || {
            let _ = tx.send(handler(&attempt));
        });
    if let Err(e) = spawned {
        return JobResult::Failure(format!("failed to start job attempt: {e}"));
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            JobResult::TimedOut(format!("attempt timed out after {}ms", timeout.as_millis()))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => JobResult::Failure("job handler panicked".to_string()),
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        stats.lock().unwrap_or_else(|p| p.into_inner()).uptime_secs = start_time.elapsed().as_secs();

        match executor.store.claim_next(config.tenant_id, executor.clock.now()) {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = job.kind.type_name(), "claimed job");

                let result = executor.execute_one(&mut job);

                let mut s = stats.lock().unwrap_or_else(|p| p.into_inner());
                s.jobs_processed += 1;
                match &result {
                    Ok(()) => s.jobs_succeeded += 1,
                    Err(_) => {
                        s.jobs_failed += 1;
                        if matches!(job.status, JobStatus::DeadLettered { .. }) {
                            s.jobs_dead_lettered += 1;
                        }
                    }
                }
                drop(s);

                if let Err(e) = result {
                    debug!(
                        executor = %config.name,
                        job_id = %job.id,
                        error = %e,
                        status = ?job.status,
                        "job execution failed"
                    );
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use stockpilot_core::ManualClock;

    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;

    fn setup() -> (Arc<InMemoryJobStore>, Arc<ManualClock>, DateTime<Utc>) {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        (InMemoryJobStore::arc(), Arc::new(ManualClock::new(t0)), t0)
    }

    #[test]
    fn execute_successful_job() {
        let (store, clock, t0) = setup();
        let mut executor = JobExecutor::new(store.clone(), clock);
        executor.register_handler("test", |_job| JobResult::Success);

        let tenant = TenantId::new();
        store
            .enqueue(Job::new(tenant, JobKind::custom("test"), serde_json::json!({}), t0))
            .unwrap();

        assert_eq!(executor.run_ready(Some(tenant)), 1);
        assert_eq!(store.stats(tenant).unwrap().completed, 1);
    }

    #[test]
    fn failing_job_backs_off_then_dead_letters() {
        let (store, clock, t0) = setup();
        let mut executor = JobExecutor::new(store.clone(), clock.clone());
        executor.register_handler("test", |_job| JobResult::Failure("test error".to_string()));

        let tenant = TenantId::new();
        store
            .enqueue(
                Job::new(tenant, JobKind::custom("test"), serde_json::json!({}), t0)
                    .with_retry_policy(RetryPolicy::fixed(2, std::time::Duration::from_secs(60))),
            )
            .unwrap();

        assert_eq!(executor.run_ready(Some(tenant)), 1);
        assert_eq!(store.stats(tenant).unwrap().failed, 1);
        // Backoff not yet elapsed.
        assert_eq!(executor.run_ready(Some(tenant)), 0);

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(executor.run_ready(Some(tenant)), 1);
        assert_eq!(store.list_dead_letters(tenant, 10).unwrap().len(), 1);
    }

    #[test]
    fn category_handler_routes_rule_actions() {
        let (store, clock, t0) = setup();
        let mut executor = JobExecutor::new(store.clone(), clock);
        executor.register_handler("rule_action.*", |_job| JobResult::Skipped("rule inactive".to_string()));

        let tenant = TenantId::new();
        let mut job = Job::new(tenant, JobKind::rule_action("update_stock"), serde_json::json!({}), t0);
        store.enqueue(job.clone()).unwrap();
        job.mark_running(t0);

        assert!(executor.execute_one(&mut job).is_ok());
        assert!(matches!(job.status, JobStatus::Completed));
    }

    #[test]
    fn timed_out_attempt_is_never_retried() {
        let (store, clock, t0) = setup();
        let mut executor = JobExecutor::new(store.clone(), clock.clone());
        let runs = Arc::new(Mutex::new(0u32));
        let counter = runs.clone();
        executor.register_handler("slow", move |_job| {
            thread::sleep(Duration::from_millis(200));
            *counter.lock().unwrap() += 1;
            JobResult::Success
        });

        let tenant = TenantId::new();
        store
            .enqueue(
                Job::new(tenant, JobKind::custom("slow"), serde_json::json!({}), t0)
                    .with_retry_policy(RetryPolicy::fixed(3, Duration::from_secs(1)))
                    .with_timeout(Duration::from_millis(20)),
            )
            .unwrap();

        assert_eq!(executor.run_ready(Some(tenant)), 1);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(executor.run_ready(Some(tenant)), 0);

        let dead = store.list_dead_letters(tenant, 10).unwrap();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("timed out"));
        assert!(matches!(dead[0].job.status, JobStatus::DeadLettered { attempts: 1, .. }));

        // The detached attempt still completes, exactly once.
        thread::sleep(Duration::from_millis(400));
        assert_eq!(*runs.lock().unwrap(), 1);
    }

    #[test]
    fn unknown_kind_fails() {
        let (store, clock, t0) = setup();
        let executor = JobExecutor::new(store.clone(), clock);
        let tenant = TenantId::new();
        let mut job = Job::new(tenant, JobKind::custom("nobody"), serde_json::json!({}), t0);
        store.enqueue(job.clone()).unwrap();
        job.mark_running(t0);

        assert!(executor.execute_one(&mut job).is_err());
    }
}
