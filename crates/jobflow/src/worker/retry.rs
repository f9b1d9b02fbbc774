use chrono::{DateTime, Utc};
use rand::Rng;

/// Cooldown applied when a failed job is released.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub base_seconds: i64,
    pub max_seconds: i64,
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_seconds: 2,
            max_seconds: 15 * 60,
            jitter_pct: 0.20,
        }
    }
}

impl RetryConfig {
    /// When a job that has now failed `fail_count` times becomes eligible again.
    pub fn next_run_after(&self, fail_count: i32, rng: &mut impl Rng) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(next_delay_seconds(fail_count, self, rng))
    }
}

pub fn next_delay_seconds(fail_count: i32, cfg: &RetryConfig, rng: &mut impl Rng) -> i64 {
    let fail_count = fail_count.max(1) as u32;

    // exponent = fail_count - 1
    let exp = fail_count.saturating_sub(1);

    // 2^exp; past 63 bits the cap takes over anyway
    let pow2 = 1_i64.checked_shl(exp).unwrap_or(i64::MAX);

    let delay = cfg.base_seconds.saturating_mul(pow2).min(cfg.max_seconds);

    // jitter in range [-jitter_pct, +jitter_pct]
    let jitter_range = (delay as f64) * cfg.jitter_pct;
    let jitter = if jitter_range > 0.0 {
        rng.gen_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    let jittered = (delay as f64 + jitter).round() as i64;
    jittered.clamp(0, cfg.max_seconds)
}
