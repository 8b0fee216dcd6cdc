//! # SocialHands Monitor
//!
//! Worker liveness and the aggregated status report.
//!
//! ## Features
//!
//! - Heartbeat writer loop for workers
//! - Liveness checks against a single stale threshold
//! - Status snapshot that degrades to nulls when the store is down

pub mod error;
pub mod health;
pub mod heartbeat;
pub mod status;

pub use error::MonitorError;
pub use health::{ComponentHealth, HealthStatus};
pub use heartbeat::{Heartbeater, HeartbeatMonitor};
pub use status::{ScheduleSummary, StatusCollector, StatusReport};
