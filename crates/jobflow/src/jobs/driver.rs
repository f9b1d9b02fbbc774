use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueError;
use crate::jobs::identity::WorkerId;
use crate::jobs::model::{ClaimSize, JobFilter, JobId, JobRecord, NewJob};

/// Storage contract for the queue.
///
/// Every method may be called concurrently from many workers against the same
/// backing store. The only synchronization the engine relies on is the
/// backend's claim primitive: two racing `claim` calls must end up owning
/// disjoint rows.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Identity written into `claimed_by` by this driver's claims.
    fn worker_id(&self) -> &WorkerId;

    /// Insert a new unclaimed job. Duplicates are allowed.
    async fn add(&self, job: NewJob) -> Result<JobId, QueueError>;

    /// Atomically claim the best-ranked eligible rows.
    ///
    /// Eligible: unclaimed, `run_after <= now`, and matching `job_name` when
    /// given. Ranking: priority, then fail_count, then id, all ascending.
    /// Rows come back already claimed and in ranking order.
    async fn claim(
        &self,
        job_name: Option<&str>,
        size: ClaimSize,
    ) -> Result<Vec<JobRecord>, QueueError>;

    /// Return a claimed row to the pool.
    ///
    /// Has no effect on a row this identity no longer owns.
    async fn release(
        &self,
        record: &JobRecord,
        inc_fail_count: bool,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError>;

    /// Remove rows permanently. Unknown ids are ignored.
    async fn delete(&self, ids: &[JobId]) -> Result<u64, QueueError>;

    /// Remove a row only while this identity still holds its claim.
    ///
    /// Returns `false` when the claim is gone (reaped, possibly reclaimed by
    /// another worker); the row is left alone in that case.
    async fn delete_claimed(&self, record: &JobRecord) -> Result<bool, QueueError>;

    /// Refresh `claimed_at` on a row this identity still owns so the reaper
    /// keeps treating the claim as live. Returns `false` when the claim is gone.
    async fn heartbeat(&self, record: &JobRecord) -> Result<bool, QueueError>;

    /// Remove every row regardless of claim state.
    async fn clear(&self) -> Result<u64, QueueError>;

    async fn count(&self, filter: &JobFilter) -> Result<i64, QueueError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, QueueError>;

    /// Unclaim rows whose claim is older than `claim_timeout`, counting the
    /// abandoned attempt as a failure.
    async fn reclaim_expired(&self, claim_timeout: Duration) -> Result<u64, QueueError>;
}
