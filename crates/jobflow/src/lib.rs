//! Persistent job queue with claim/execute/retry workers.
//!
//! Producers [`Driver::add`] jobs; workers claim them one at a time, dispatch
//! them to handlers registered on [`WorkerEvents`], and delete or release them
//! according to what the handlers reported.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod telemetry;
pub mod worker;

pub use error::QueueError;
pub use events::{boxed, BoxFuture, EventBus, Propagation};
pub use jobs::{
    ClaimSize, Driver, Job, JobFilter, JobId, JobRecord, MemoryDriver, MemoryStore, NewJob,
    Outcome, PgDriver, Scope, WorkerId,
};
pub use worker::{
    IdleMode, JobHooks, LoopEvent, ProcessEvent, Resolution, RunSummary, StopReason, Worker,
    WorkerContext, WorkerEvents, WorkerOptions,
};
