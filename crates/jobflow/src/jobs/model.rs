use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JobId = i64;

/// One persisted unit of work.
///
/// `claimed_by` is empty exactly when the row is eligible for claiming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: JobId,
    pub priority: i16,
    pub run_after: DateTime<Utc>,
    pub claimed_by: String,
    pub claimed_at: Option<DateTime<Utc>>,
    pub fail_count: i32,
    pub job_name: String,
    pub job_data: Value,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn is_claimed(&self) -> bool {
        !self.claimed_by.is_empty()
    }

    /// Ranking key used by claim: lower sorts first.
    pub fn rank(&self) -> (i16, i32, JobId) {
        (self.priority, self.fail_count, self.id)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_after <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_name: String,
    pub job_data: Value,
    pub priority: i16,
    pub run_after: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(job_name: impl Into<String>, job_data: Value) -> Self {
        Self {
            job_name: job_name.into(),
            job_data,
            priority: 0,
            run_after: None,
        }
    }

    /// Build from any serializable payload.
    pub fn with_payload<T: Serialize>(
        job_name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(job_name, serde_json::to_value(payload)?))
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn run_after(mut self, at: DateTime<Utc>) -> Self {
        self.run_after = Some(at);
        self
    }

    pub fn run_in(self, delay: chrono::Duration) -> Self {
        self.run_after(Utc::now() + delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimSize {
    Single,
    All,
}

impl ClaimSize {
    pub fn limit(self) -> Option<i64> {
        match self {
            ClaimSize::Single => Some(1),
            ClaimSize::All => None,
        }
    }
}

/// Which rows a count/list looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Rows claimed by the calling driver's identity.
    #[default]
    Owned,
    Unclaimed,
    /// Everything, claimed or not. Administrative use.
    All,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub job_name: Option<String>,
    pub including_deferred: bool,
    pub scope: Scope,
}

impl JobFilter {
    pub fn owned() -> Self {
        Self::default()
    }

    pub fn unclaimed() -> Self {
        Self {
            scope: Scope::Unclaimed,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            scope: Scope::All,
            ..Self::default()
        }
    }

    pub fn job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    pub fn including_deferred(mut self) -> Self {
        self.including_deferred = true;
        self
    }

    /// In-process evaluation, shared by the memory backend.
    pub(crate) fn matches(&self, record: &JobRecord, owner: &str, now: DateTime<Utc>) -> bool {
        if let Some(name) = &self.job_name {
            if record.job_name != *name {
                return false;
            }
        }
        if !self.including_deferred && !record.is_due(now) {
            return false;
        }
        match self.scope {
            Scope::Owned => record.claimed_by == owner,
            Scope::Unclaimed => !record.is_claimed(),
            Scope::All => true,
        }
    }
}
