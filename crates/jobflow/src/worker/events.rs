use std::fmt;

use crate::events::{BoxFuture, EventBus, Propagation};
use crate::jobs::{Job, JobRecord, WorkerId};

pub const PROCESS_TOPIC_PREFIX: &str = "Queue.Worker.Process:";
pub const LOOP_TOPIC: &str = "Queue.Worker.Loop";

pub fn process_topic(job_name: &str) -> String {
    format!("{PROCESS_TOPIC_PREFIX}{job_name}")
}

/// What handlers get to see of the worker running them.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    id: WorkerId,
}

impl WorkerContext {
    pub fn new(id: WorkerId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn log(&self, message: impl fmt::Display) {
        tracing::info!(worker_id = %self.id, "{message}");
    }
}

/// Sent once per claimed job on `Queue.Worker.Process:{job_name}`.
#[derive(Debug)]
pub struct ProcessEvent {
    pub worker: WorkerContext,
    pub job: Job,
}

impl ProcessEvent {
    pub fn record(&self) -> &JobRecord {
        self.job.record()
    }
}

/// Sent once per loop iteration on `Queue.Worker.Loop`.
/// `Propagation::Stop` from any handler ends `Worker::run`.
#[derive(Debug, Clone)]
pub struct LoopEvent {
    pub worker: WorkerContext,
}

#[derive(Debug, Default)]
pub struct WorkerEvents {
    pub(crate) process: EventBus<ProcessEvent>,
    pub(crate) control: EventBus<LoopEvent>,
}

impl WorkerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to jobs by name; `*` works as a wildcard (`"*"` catches all).
    pub fn on_job<F>(&mut self, job_name: &str, handler: F)
    where
        F: for<'a> Fn(&'a ProcessEvent) -> BoxFuture<'a, anyhow::Result<Propagation>>
            + Send
            + Sync
            + 'static,
    {
        self.process.on(&process_topic(job_name), handler);
    }

    /// Subscribe with a full topic, e.g. `Queue.Worker.Process:*`.
    pub fn on_process<F>(&mut self, topic: &str, handler: F)
    where
        F: for<'a> Fn(&'a ProcessEvent) -> BoxFuture<'a, anyhow::Result<Propagation>>
            + Send
            + Sync
            + 'static,
    {
        self.process.on(topic, handler);
    }

    pub fn on_loop<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a LoopEvent) -> BoxFuture<'a, anyhow::Result<Propagation>>
            + Send
            + Sync
            + 'static,
    {
        self.control.on(LOOP_TOPIC, handler);
    }

    pub fn handles(&self, job_name: &str) -> bool {
        self.process.has_listeners(&process_topic(job_name))
    }
}
