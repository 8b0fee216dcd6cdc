//! # SocialHands Scheduler
//!
//! Turns the task configuration and a strategy focus into a conflict-free
//! plan of time slots per day, and promotes each slot into a job once its
//! start time arrives.

pub mod activity;
pub mod error;
pub mod generator;
pub mod service;
pub mod slot;
pub mod tasks;
pub mod template;

pub use activity::{ActivityType, StrategyFocus};
pub use error::SchedulerError;
pub use generator::ScheduleWindow;
pub use service::{PromotionReport, ScheduleService, SlotOutcomeRecorder, SlotSpec};
pub use slot::{DailySchedule, ScheduleProgress, ScheduleSlot, SlotStatus};
pub use tasks::{default_task_configuration, task_ids};
