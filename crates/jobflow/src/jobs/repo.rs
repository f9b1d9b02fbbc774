// crates/jobflow/src/jobs/repo.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::error::QueueError;
use crate::jobs::driver::Driver;
use crate::jobs::identity::WorkerId;
use crate::jobs::model::{ClaimSize, JobFilter, JobId, JobRecord, NewJob, Scope};

const RECORD_COLUMNS: &str =
    "id, priority, run_after, claimed_by, claimed_at, fail_count, job_name, job_data, created_at";

/// Postgres backend over the `queue_jobs` table.
#[derive(Clone)]
pub struct PgDriver {
    pool: PgPool,
    worker_id: WorkerId,
}

impl PgDriver {
    pub fn new(pool: PgPool, worker_id: WorkerId) -> Self {
        Self { pool, worker_id }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Same pool, different identity. Lets one process act as several workers.
    pub fn with_worker_id(&self, worker_id: WorkerId) -> Self {
        Self {
            pool: self.pool.clone(),
            worker_id,
        }
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let job = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM queue_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    fn scope_owner<'a>(&'a self, filter: &JobFilter) -> Option<&'a str> {
        match filter.scope {
            Scope::Owned => Some(self.worker_id.as_str()),
            Scope::Unclaimed => Some(""),
            Scope::All => None,
        }
    }
}

#[async_trait]
impl Driver for PgDriver {
    fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    #[instrument(skip_all, err, fields(job_name = %job.job_name))]
    async fn add(&self, job: NewJob) -> Result<JobId, QueueError> {
        let id: JobId = sqlx::query_scalar(
            r#"
            INSERT INTO queue_jobs (job_name, job_data, priority, run_after)
            VALUES ($1, $2, $3, COALESCE($4, now()))
            RETURNING id
            "#,
        )
        .bind(&job.job_name)
        .bind(&job.job_data)
        .bind(job.priority)
        .bind(job.run_after)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    // ----------------------------
    // Claiming
    // ----------------------------

    /// The inner SELECT picks candidates in ranking order and row-locks them
    /// with SKIP LOCKED, so a concurrent claimer moves on to other rows instead
    /// of waiting. The outer UPDATE re-checks `claimed_by = ''`, which keeps a
    /// row from being taken twice even under READ COMMITTED re-evaluation.
    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_name = ?job_name))]
    async fn claim(
        &self,
        job_name: Option<&str>,
        size: ClaimSize,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let mut rows = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            UPDATE queue_jobs
            SET claimed_by = $1,
                claimed_at = now()
            WHERE claimed_by = ''
              AND id IN (
                SELECT id
                FROM queue_jobs
                WHERE claimed_by = ''
                  AND run_after <= now()
                  AND ($2::text IS NULL OR job_name = $2)
                ORDER BY priority ASC, fail_count ASC, id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
              )
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(self.worker_id.as_str())
        .bind(job_name)
        .bind(size.limit())
        .fetch_all(&self.pool)
        .await?;

        // RETURNING order is unspecified
        rows.sort_by_key(JobRecord::rank);
        Ok(rows)
    }

    // ----------------------------
    // State transitions
    // ----------------------------

    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_id = record.id))]
    async fn release(
        &self,
        record: &JobRecord,
        inc_fail_count: bool,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET claimed_by = '',
                claimed_at = NULL,
                fail_count = fail_count + $2,
                run_after = COALESCE($3, run_after)
            WHERE id = $1
              AND claimed_by = $4
            "#,
        )
        .bind(record.id)
        .bind(i32::from(inc_fail_count))
        .bind(run_after)
        .bind(self.worker_id.as_str())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            tracing::warn!(
                job_id = record.id,
                worker_id = %self.worker_id,
                "release skipped: job is no longer claimed by this worker"
            );
        }

        Ok(())
    }

    #[instrument(skip_all, err, fields(count = ids.len()))]
    async fn delete(&self, ids: &[JobId]) -> Result<u64, QueueError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let res = sqlx::query("DELETE FROM queue_jobs WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected())
    }

    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_id = record.id))]
    async fn delete_claimed(&self, record: &JobRecord) -> Result<bool, QueueError> {
        let res = sqlx::query("DELETE FROM queue_jobs WHERE id = $1 AND claimed_by = $2")
            .bind(record.id)
            .bind(self.worker_id.as_str())
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            tracing::warn!(
                job_id = record.id,
                worker_id = %self.worker_id,
                "delete skipped: job is no longer claimed by this worker"
            );
            return Ok(false);
        }

        Ok(true)
    }

    #[instrument(skip_all, err, fields(worker_id = %self.worker_id, job_id = record.id))]
    async fn heartbeat(&self, record: &JobRecord) -> Result<bool, QueueError> {
        let res = sqlx::query(
            "UPDATE queue_jobs SET claimed_at = now() WHERE id = $1 AND claimed_by = $2",
        )
        .bind(record.id)
        .bind(self.worker_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip_all, err)]
    async fn clear(&self) -> Result<u64, QueueError> {
        let res = sqlx::query("DELETE FROM queue_jobs")
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected())
    }

    // ----------------------------
    // Reads
    // ----------------------------

    async fn count(&self, filter: &JobFilter) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM queue_jobs
            WHERE ($1::text IS NULL OR job_name = $1)
              AND ($2 OR run_after <= now())
              AND ($3::text IS NULL OR claimed_by = $3)
            "#,
        )
        .bind(filter.job_name.as_deref())
        .bind(filter.including_deferred)
        .bind(self.scope_owner(filter))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, QueueError> {
        let rows = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM queue_jobs
            WHERE ($1::text IS NULL OR job_name = $1)
              AND ($2 OR run_after <= now())
              AND ($3::text IS NULL OR claimed_by = $3)
            ORDER BY priority ASC, fail_count ASC, id ASC
            "#
        ))
        .bind(filter.job_name.as_deref())
        .bind(filter.including_deferred)
        .bind(self.scope_owner(filter))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ----------------------------
    // Maintenance
    // ----------------------------

    #[instrument(skip_all, err)]
    async fn reclaim_expired(&self, claim_timeout: Duration) -> Result<u64, QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET claimed_by = '',
                claimed_at = NULL,
                fail_count = fail_count + 1
            WHERE claimed_by <> ''
              AND claimed_at IS NOT NULL
              AND claimed_at < now() - ($1::float8 * interval '1 second')
            "#,
        )
        .bind(claim_timeout.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}
