//! Queue, heartbeat and scheduler configuration.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Job queue and execution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum execution attempts per job, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between claim polls when no job is claimable.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Backoff before the second attempt; doubled for each further attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for the retry backoff.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Hard limit for a single handler attempt.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_job_timeout_secs() -> u64 {
    300
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

/// Worker heartbeat configuration.
///
/// Every reader of the heartbeat uses `stale_after_secs`, so workers and
/// the status endpoint always agree on liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    30
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

/// Daily schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval of the slot promotion pass.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Earliest slot start, `HH:MM` local time.
    #[serde(default = "default_day_start")]
    pub day_start: String,

    /// Latest slot end, `HH:MM` local time.
    #[serde(default = "default_day_end")]
    pub day_end: String,

    /// Offset of the operator's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Strategy focus: balanced, growth, engagement or content.
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_check_interval() -> u64 {
    30
}

fn default_day_start() -> String {
    "08:00".to_string()
}

fn default_day_end() -> String {
    "22:00".to_string()
}

fn default_strategy() -> String {
    "balanced".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            day_start: default_day_start(),
            day_end: default_day_end(),
            utc_offset_minutes: 0,
            strategy: default_strategy(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the daily window bounds.
    pub fn window(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let start = parse_clock("scheduler.day_start", &self.day_start)?;
        let end = parse_clock("scheduler.day_end", &self.day_end)?;
        Ok((start, end))
    }
}

fn parse_clock(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("expected HH:MM, got {:?}: {}", value, e),
    })
}
