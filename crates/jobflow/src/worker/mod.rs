//! The worker run loop.
//!
//! One worker handles one job at a time: claim, dispatch, resolve, then ask
//! the loop-control listeners whether to keep going. Concurrency only exists
//! between workers and is settled by the driver's claim primitive.

pub mod events;
pub mod hooks;
pub mod retry;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, SeedableRng};

use crate::error::QueueError;
use crate::jobs::{ClaimSize, Driver, Job, JobRecord, Outcome, WorkerId};

pub use events::{
    process_topic, LoopEvent, ProcessEvent, WorkerContext, WorkerEvents, LOOP_TOPIC,
    PROCESS_TOPIC_PREFIX,
};
pub use hooks::{DefaultHooks, JobHooks};
pub use retry::RetryConfig;

/// What `run` does when a claim comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleMode {
    /// Return from `run`. Suits cron-style invocation.
    SinglePass,
    /// Sleep and poll again.
    Daemon { poll_interval: Duration },
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// A job whose fail count would go past this is deleted instead of released.
    pub max_fails: u32,
    pub idle: IdleMode,
    /// Only claim jobs with this name.
    pub job_name: Option<String>,
    /// Reclaim rows whose claim is older than this. `None` disables the reaper.
    /// While set, the worker also refreshes its own claim during dispatch.
    pub claim_timeout: Option<Duration>,
    pub reap_interval: Duration,
    /// Cooldown for released jobs. `None` makes them eligible immediately.
    pub retry_backoff: Option<RetryConfig>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_fails: 3,
            idle: IdleMode::SinglePass,
            job_name: None,
            claim_timeout: None,
            reap_interval: Duration::from_secs(10),
            retry_backoff: None,
        }
    }
}

/// How a claimed job left the worker's hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Deleted,
    Released,
    Escalated,
    /// The claim was reaped while the handler ran; the row was left alone.
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left to claim (single-pass mode).
    Drained,
    /// A loop-control listener asked to stop.
    Terminated,
}

/// Counters for one `run`. Every processed job lands in exactly one of
/// `succeeded`, `retried`, `unhandled`, `escalated` or `lost`; `retried` and
/// `unhandled` only count jobs that went back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub unhandled: u64,
    pub escalated: u64,
    pub lost: u64,
    pub reclaimed: u64,
    pub stop: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            retried: 0,
            unhandled: 0,
            escalated: 0,
            lost: 0,
            reclaimed: 0,
            stop: StopReason::Drained,
        }
    }

    fn record(&mut self, outcome: Outcome, resolution: Resolution) {
        self.processed += 1;
        match (resolution, outcome) {
            (Resolution::Lost, _) => self.lost += 1,
            (Resolution::Escalated, _) => self.escalated += 1,
            (_, Outcome::Success) => self.succeeded += 1,
            (_, Outcome::Retry) => self.retried += 1,
            (_, Outcome::Unhandled) => self.unhandled += 1,
        }
    }
}

pub struct Worker {
    driver: Arc<dyn Driver>,
    events: Arc<WorkerEvents>,
    hooks: Arc<dyn JobHooks>,
    options: WorkerOptions,
    ctx: WorkerContext,
}

impl Worker {
    /// The worker takes its identity from the driver.
    pub fn new(driver: Arc<dyn Driver>, events: WorkerEvents) -> Self {
        let ctx = WorkerContext::new(driver.worker_id().clone());
        Self {
            driver,
            events: Arc::new(events),
            hooks: Arc::new(DefaultHooks),
            options: WorkerOptions::default(),
            ctx,
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn JobHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn id(&self) -> &WorkerId {
        self.ctx.id()
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn log(&self, message: impl std::fmt::Display) {
        self.ctx.log(message);
    }

    /// Claim, dispatch and resolve jobs until nothing is left (single-pass)
    /// or a loop-control listener asks to stop.
    ///
    /// Storage errors and handler errors end the run; everything a handler
    /// reports through the job flags is settled inside the loop.
    pub async fn run(&self) -> Result<RunSummary, QueueError> {
        let mut summary = RunSummary::new();
        let mut last_reap_at: Option<Instant> = None;

        tracing::info!(
            worker_id = %self.ctx.id(),
            max_fails = self.options.max_fails,
            idle = ?self.options.idle,
            job_name = ?self.options.job_name,
            "worker starting"
        );

        loop {
            if let Some(timeout) = self.options.claim_timeout {
                let due = last_reap_at.map_or(true, |at| at.elapsed() >= self.options.reap_interval);
                if due {
                    summary.reclaimed += self.reap(timeout).await?;
                    last_reap_at = Some(Instant::now());
                }
            }

            let claimed = self.claim_one().await?;
            let found = claimed.is_some();

            if let Some(record) = claimed {
                let (outcome, resolution) = self.execute(record).await?;
                summary.record(outcome, resolution);
            }

            if self.should_terminate().await? {
                tracing::info!(worker_id = %self.ctx.id(), "loop terminated by listener");
                summary.stop = StopReason::Terminated;
                break;
            }

            if !found {
                match self.options.idle {
                    IdleMode::SinglePass => {
                        summary.stop = StopReason::Drained;
                        break;
                    }
                    IdleMode::Daemon { poll_interval } => {
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
        }

        tracing::info!(
            worker_id = %self.ctx.id(),
            processed = summary.processed,
            succeeded = summary.succeeded,
            retried = summary.retried,
            unhandled = summary.unhandled,
            escalated = summary.escalated,
            lost = summary.lost,
            stop = ?summary.stop,
            "worker stopped"
        );

        Ok(summary)
    }

    /// Claim and resolve at most one job, without loop-control dispatch.
    pub async fn run_once(&self) -> Result<Option<Outcome>, QueueError> {
        match self.claim_one().await? {
            Some(record) => Ok(Some(self.execute(record).await?.0)),
            None => Ok(None),
        }
    }

    async fn claim_one(&self) -> Result<Option<JobRecord>, QueueError> {
        let mut claimed = self
            .driver
            .claim(self.options.job_name.as_deref(), ClaimSize::Single)
            .await?
            .into_iter();
        let first = claimed.next();

        // a single claim must not leave rows parked under this identity
        for extra in claimed {
            tracing::warn!(
                worker_id = %self.ctx.id(),
                job_id = extra.id,
                "single claim returned extra row, releasing it"
            );
            self.driver.release(&extra, false, None).await?;
        }

        Ok(first)
    }

    async fn reap(&self, timeout: Duration) -> Result<u64, QueueError> {
        let reclaimed = self.driver.reclaim_expired(timeout).await?;
        if reclaimed > 0 {
            tracing::info!(
                worker_id = %self.ctx.id(),
                reclaimed,
                "reclaimed jobs with expired claims"
            );
        }
        Ok(reclaimed)
    }

    async fn should_terminate(&self) -> Result<bool, QueueError> {
        let event = LoopEvent {
            worker: self.ctx.clone(),
        };
        self.events
            .control
            .dispatch(LOOP_TOPIC, &event)
            .await
            .map_err(QueueError::LoopControl)
    }

    /// Dispatch one claimed job and settle it in the store.
    async fn execute(&self, record: JobRecord) -> Result<(Outcome, Resolution), QueueError> {
        let job_id = record.id;
        let job_name = record.job_name.clone();
        let topic = process_topic(&job_name);

        tracing::debug!(
            worker_id = %self.ctx.id(),
            job_id,
            job_name = %job_name,
            fail_count = record.fail_count,
            "dispatching job"
        );

        let event = ProcessEvent {
            worker: self.ctx.clone(),
            job: Job::new(record),
        };

        let dispatch = self.events.process.dispatch(&topic, &event);
        let dispatched = match self.options.claim_timeout {
            Some(timeout) => {
                tokio::select! {
                    res = dispatch => res,
                    never = self.keep_claim(event.record(), timeout) => match never {},
                }
            }
            None => dispatch.await,
        };
        if let Err(source) = dispatched {
            let record = event.job.into_record();
            tracing::error!(
                worker_id = %self.ctx.id(),
                job_id,
                job_name = %job_name,
                error = %source,
                "handler failed, releasing job"
            );
            self.fail(&record).await?;
            return Err(QueueError::Handler {
                job_id,
                job_name,
                source,
            });
        }

        let outcome = event.job.outcome();
        let record = event.job.into_record();

        let resolution = match outcome {
            Outcome::Success => {
                if self.driver.delete_claimed(&record).await? {
                    Resolution::Deleted
                } else {
                    Resolution::Lost
                }
            }
            Outcome::Retry => self.fail(&record).await?,
            Outcome::Unhandled => {
                self.hooks.unhandled_job(&self.ctx, &record).await;
                self.fail(&record).await?
            }
        };

        tracing::info!(
            worker_id = %self.ctx.id(),
            job_id,
            job_name = %job_name,
            outcome = ?outcome,
            resolution = ?resolution,
            "job resolved"
        );

        Ok((outcome, resolution))
    }

    /// Refresh this worker's claim every third of `claim_timeout` for as
    /// long as the dispatch runs. Never completes; the caller drops it.
    async fn keep_claim(&self, record: &JobRecord, claim_timeout: Duration) -> Infallible {
        let interval = (claim_timeout / 3).max(Duration::from_millis(5));
        loop {
            tokio::time::sleep(interval).await;
            match self.driver.heartbeat(record).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        worker_id = %self.ctx.id(),
                        job_id = record.id,
                        "claim lost while handler was running"
                    );
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        worker_id = %self.ctx.id(),
                        job_id = record.id,
                        error = %err,
                        "claim heartbeat failed"
                    );
                }
            }
        }
        std::future::pending().await
    }

    /// Release with an incremented fail count, or delete once the count
    /// would pass `max_fails`.
    async fn fail(&self, record: &JobRecord) -> Result<Resolution, QueueError> {
        let next_fail_count = record.fail_count.saturating_add(1);

        if i64::from(next_fail_count) > i64::from(self.options.max_fails) {
            if !self.driver.delete_claimed(record).await? {
                return Ok(Resolution::Lost);
            }
            self.hooks.too_many_fails(&self.ctx, record).await;
            return Ok(Resolution::Escalated);
        }

        let run_after = match &self.options.retry_backoff {
            Some(cfg) => {
                let mut rng = StdRng::from_entropy();
                Some(cfg.next_run_after(next_fail_count, &mut rng))
            }
            None => None,
        };

        self.driver.release(record, true, run_after).await?;
        Ok(Resolution::Released)
    }
}
