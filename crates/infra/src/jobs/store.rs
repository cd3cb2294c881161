//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use stockpilot_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobKind, JobStatus};

pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending (or retry-due) job that is ready at `now` and mark
    /// it running.
    fn claim_next(&self, tenant_id: Option<TenantId>, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError>;

    fn list_by_kind(&self, tenant_id: TenantId, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String, at: DateTime<Utc>) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending with a fresh attempt budget.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::Poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::Poisoned)?;
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::Poisoned)?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, tenant_id: Option<TenantId>, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::Poisoned)?;

        let next = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready(now)
                    && tenant_id.is_none_or(|t| j.tenant_id == t)
            })
            .min_by_key(|j| (j.scheduled_at.unwrap_or(j.created_at), j.created_at))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running(now);
                job.clone()
            })
        }))
    }

    fn list_by_kind(&self, tenant_id: TenantId, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && &j.kind == kind)
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::Poisoned)?;
        let mut dls = self.dead_letters.write().map_err(|_| JobStoreError::Poisoned)?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = at;

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason, at));
        Ok(())
    }

    fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut result: Vec<_> = dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::Poisoned)?;
        let mut dls = self.dead_letters.write().map_err(|_| JobStoreError::Poisoned)?;

        match dls.get(&job_id) {
            None => return Err(JobStoreError::NotFound(job_id)),
            Some(entry) if entry.job.tenant_id != tenant_id => {
                return Err(JobStoreError::TenantIsolation);
            }
            Some(_) => {}
        }
        let Some(entry) = dls.remove(&job_id) else {
            return Err(JobStoreError::NotFound(job_id));
        };

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = now;
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::Poisoned)?;
        let dls = self.dead_letters.read().map_err(|_| JobStoreError::Poisoned)?;

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += dls.values().filter(|e| e.job.tenant_id == tenant_id).count();

        Ok(stats)
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id, now)
    }

    fn list_by_kind(&self, tenant_id: TenantId, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_kind(tenant_id, kind, limit)
    }

    fn dead_letter(&self, job: Job, reason: String, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason, at)
    }

    fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id, now)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}
