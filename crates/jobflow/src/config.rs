use std::time::Duration;

use crate::jobs::WorkerId;
use crate::telemetry::LogFormat;
use crate::worker::{IdleMode, RetryConfig, WorkerOptions};

// Config is the one place runtime settings come from.
// Every value is read from the environment (after loading .env) and parsed into a typed field.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: Option<WorkerId>,
    pub job_name: Option<String>,
    pub max_fails: u32,
    pub idle_mode: IdleMode,
    pub claim_timeout: Option<Duration>,
    pub reap_interval: Duration,
    pub retry_backoff: bool,
    pub migrate_on_startup: bool,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("JOBFLOW_DATABASE_URL", "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = env_or_fallback("JOBFLOW_WORKER_ID", "WORKER_ID")
            .map(WorkerId::new)
            .transpose()?;

        let job_name = env_or_fallback("JOBFLOW_JOB_NAME", "JOB_NAME");

        let max_fails = env_or_fallback("JOBFLOW_MAX_FAILS", "MAX_FAILS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let poll_interval_ms: u64 = env_or_fallback("JOBFLOW_POLL_INTERVAL_MS", "POLL_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(250);

        let idle_mode = parse_idle_mode(
            env_or_fallback("JOBFLOW_IDLE_MODE", "IDLE_MODE").as_deref(),
            Duration::from_millis(poll_interval_ms),
        )?;

        let claim_timeout = match env_or_fallback("JOBFLOW_CLAIM_TIMEOUT_SECS", "CLAIM_TIMEOUT_SECS") {
            Some(v) => parse_optional_secs(&v)?,
            None => Some(Duration::from_secs(300)),
        };

        let reap_interval_ms = env_or_fallback("JOBFLOW_REAP_INTERVAL_MS", "REAP_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);

        let retry_backoff = env_bool("JOBFLOW_RETRY_BACKOFF").unwrap_or(false);
        let migrate_on_startup = env_bool("JOBFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let log_format = match env_or_fallback("JOBFLOW_LOG_FORMAT", "LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,
            worker_id,
            job_name,
            max_fails,
            idle_mode,
            claim_timeout,
            reap_interval: Duration::from_millis(reap_interval_ms),
            retry_backoff,
            migrate_on_startup,
            log_format,
        })
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            max_fails: self.max_fails,
            idle: self.idle_mode,
            job_name: self.job_name.clone(),
            claim_timeout: self.claim_timeout,
            reap_interval: self.reap_interval,
            retry_backoff: self.retry_backoff.then(RetryConfig::default),
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_idle_mode(value: Option<&str>, poll_interval: Duration) -> anyhow::Result<IdleMode> {
    match value.map(|v| v.trim().to_lowercase()) {
        None => Ok(IdleMode::Daemon { poll_interval }),
        Some(v) => match v.as_str() {
            "daemon" | "poll" => Ok(IdleMode::Daemon { poll_interval }),
            "single-pass" | "single_pass" | "once" => Ok(IdleMode::SinglePass),
            other => anyhow::bail!("unknown idle mode {other:?} (expected daemon or single-pass)"),
        },
    }
}

fn parse_optional_secs(value: &str) -> anyhow::Result<Option<Duration>> {
    let v = value.trim().to_lowercase();
    if matches!(v.as_str(), "0" | "off" | "false" | "none") {
        return Ok(None);
    }
    match v.parse::<u64>() {
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(_) => anyhow::bail!("invalid claim timeout {value:?} (expected seconds or off)"),
    }
}
