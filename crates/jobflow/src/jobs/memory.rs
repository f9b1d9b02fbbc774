use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::QueueError;
use crate::jobs::driver::Driver;
use crate::jobs::identity::WorkerId;
use crate::jobs::model::{ClaimSize, JobFilter, JobId, JobRecord, NewJob};

#[derive(Debug, Default)]
struct StoreState {
    next_id: JobId,
    jobs: BTreeMap<JobId, JobRecord>,
}

/// Shared in-process table. Clones point at the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row, whatever its claim state.
    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.state.read().await.jobs.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory backend. Claims are atomic because they run under the store's
/// write lock.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    store: MemoryStore,
    worker_id: WorkerId,
}

impl MemoryDriver {
    pub fn new(worker_id: WorkerId) -> Self {
        Self::with_store(MemoryStore::new(), worker_id)
    }

    pub fn with_store(store: MemoryStore, worker_id: WorkerId) -> Self {
        Self { store, worker_id }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    #[instrument(skip_all, err, fields(job_name = %job.job_name))]
    async fn add(&self, job: NewJob) -> Result<JobId, QueueError> {
        let now = Utc::now();
        let mut state = self.store.state.write().await;

        state.next_id += 1;
        let id = state.next_id;

        state.jobs.insert(
            id,
            JobRecord {
                id,
                priority: job.priority,
                run_after: job.run_after.unwrap_or(now),
                claimed_by: String::new(),
                claimed_at: None,
                fail_count: 0,
                job_name: job.job_name,
                job_data: job.job_data,
                created_at: now,
            },
        );

        Ok(id)
    }

    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_name = ?job_name))]
    async fn claim(
        &self,
        job_name: Option<&str>,
        size: ClaimSize,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let now = Utc::now();
        let mut state = self.store.state.write().await;

        let mut eligible: Vec<&mut JobRecord> = state
            .jobs
            .values_mut()
            .filter(|j| {
                !j.is_claimed()
                    && j.is_due(now)
                    && job_name.map_or(true, |name| j.job_name == name)
            })
            .collect();

        eligible.sort_by_key(|j| j.rank());
        if let Some(limit) = size.limit() {
            eligible.truncate(limit as usize);
        }

        let claimed = eligible
            .into_iter()
            .map(|job| {
                job.claimed_by = self.worker_id.as_str().to_string();
                job.claimed_at = Some(now);
                job.clone()
            })
            .collect();

        Ok(claimed)
    }

    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_id = record.id))]
    async fn release(
        &self,
        record: &JobRecord,
        inc_fail_count: bool,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError> {
        let mut state = self.store.state.write().await;

        match state
            .jobs
            .get_mut(&record.id)
            .filter(|j| j.claimed_by == self.worker_id.as_str())
        {
            Some(job) => {
                job.claimed_by.clear();
                job.claimed_at = None;
                if inc_fail_count {
                    job.fail_count += 1;
                }
                if let Some(at) = run_after {
                    job.run_after = at;
                }
            }
            None => {
                tracing::warn!(
                    job_id = record.id,
                    worker_id = %self.worker_id,
                    "release skipped: job is no longer claimed by this worker"
                );
            }
        }

        Ok(())
    }

    async fn delete(&self, ids: &[JobId]) -> Result<u64, QueueError> {
        let mut state = self.store.state.write().await;
        let removed = ids
            .iter()
            .filter(|id| state.jobs.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_id = record.id))]
    async fn delete_claimed(&self, record: &JobRecord) -> Result<bool, QueueError> {
        let mut state = self.store.state.write().await;

        let owned = state
            .jobs
            .get(&record.id)
            .is_some_and(|j| j.claimed_by == self.worker_id.as_str());
        if !owned {
            tracing::warn!(
                job_id = record.id,
                worker_id = %self.worker_id,
                "delete skipped: job is no longer claimed by this worker"
            );
            return Ok(false);
        }

        state.jobs.remove(&record.id);
        Ok(true)
    }

    async fn heartbeat(&self, record: &JobRecord) -> Result<bool, QueueError> {
        let mut state = self.store.state.write().await;
        match state
            .jobs
            .get_mut(&record.id)
            .filter(|j| j.claimed_by == self.worker_id.as_str())
        {
            Some(job) => {
                job.claimed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<u64, QueueError> {
        let mut state = self.store.state.write().await;
        let removed = state.jobs.len() as u64;
        state.jobs.clear();
        Ok(removed)
    }

    async fn count(&self, filter: &JobFilter) -> Result<i64, QueueError> {
        let now = Utc::now();
        let state = self.store.state.read().await;
        let count = state
            .jobs
            .values()
            .filter(|j| filter.matches(j, self.worker_id.as_str(), now))
            .count();
        Ok(count as i64)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, QueueError> {
        let now = Utc::now();
        let state = self.store.state.read().await;
        let mut rows: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| filter.matches(j, self.worker_id.as_str(), now))
            .cloned()
            .collect();
        rows.sort_by_key(JobRecord::rank);
        Ok(rows)
    }

    async fn reclaim_expired(&self, claim_timeout: Duration) -> Result<u64, QueueError> {
        let timeout = chrono::Duration::from_std(claim_timeout)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let Some(cutoff) = Utc::now().checked_sub_signed(timeout) else {
            return Ok(0);
        };

        let mut state = self.store.state.write().await;
        let mut reclaimed = 0;
        for job in state.jobs.values_mut() {
            let expired = job.is_claimed() && job.claimed_at.map_or(false, |at| at < cutoff);
            if expired {
                job.claimed_by.clear();
                job.claimed_at = None;
                job.fail_count += 1;
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }
}
