//! Error types for the queue engine.

use thiserror::Error;

use crate::jobs::JobId;

/// Errors surfaced by drivers and the worker loop.
///
/// Per-job failures (released or unhandled jobs) never show up here; they are
/// resolved inside the loop. What does show up is storage trouble and handler
/// errors the dispatch mechanism did not absorb.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid worker id {0:?}: expected 1 to 32 non-whitespace characters")]
    InvalidWorkerId(String),

    #[error("handler for job {job_id} ({job_name}) failed")]
    Handler {
        job_id: JobId,
        job_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("loop control handler failed")]
    LoopControl(#[source] anyhow::Error),
}
