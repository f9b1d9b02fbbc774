use async_trait::async_trait;

use crate::jobs::JobRecord;
use crate::worker::events::WorkerContext;

/// Extension points for the two failure escalations.
///
/// Hooks only observe. `too_many_fails` runs after the worker removed the
/// row (and only if it still held the claim); `unhandled_job` runs before the
/// release. Dead-lettering or alerting belongs here.
#[async_trait]
pub trait JobHooks: Send + Sync {
    /// The job failed more than `max_fails` times and has been deleted.
    async fn too_many_fails(&self, worker: &WorkerContext, record: &JobRecord) {
        tracing::warn!(
            worker_id = %worker.id(),
            job_id = record.id,
            job_name = %record.job_name,
            fail_count = record.fail_count,
            "job failed too many times, deleted"
        );
    }

    /// No handler claimed the job. It will be released as a failed attempt.
    async fn unhandled_job(&self, worker: &WorkerContext, record: &JobRecord) {
        tracing::warn!(
            worker_id = %worker.id(),
            job_id = record.id,
            job_name = %record.job_name,
            fail_count = record.fail_count,
            "no handler processed job"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl JobHooks for DefaultHooks {}
