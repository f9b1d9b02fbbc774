use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::QueueError;
use crate::jobs::model::JobRecord;

/// What the handlers reported for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retry,
    Unhandled,
}

/// Per-attempt wrapper around a claimed record.
///
/// Built right before dispatch and dropped once the outcome is resolved.
/// Flags are atomics so handlers can set them through a shared reference.
#[derive(Debug)]
pub struct Job {
    record: JobRecord,
    handled: AtomicBool,
    released: AtomicBool,
}

impl Job {
    pub fn new(record: JobRecord) -> Self {
        Self {
            record,
            handled: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub fn data(&self) -> &Value {
        &self.record.job_data
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(serde_json::from_value(self.record.job_data.clone())?)
    }

    pub fn set_handled(&self) {
        self.handled.store(true, Ordering::SeqCst);
    }

    /// Ask for a retry. Only meaningful together with `set_handled`.
    pub fn set_released(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn outcome(&self) -> Outcome {
        match (self.is_handled(), self.is_released()) {
            (true, false) => Outcome::Success,
            (true, true) => Outcome::Retry,
            (false, _) => Outcome::Unhandled,
        }
    }

    pub fn into_record(self) -> JobRecord {
        self.record
    }
}
