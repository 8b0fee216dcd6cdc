//! # SocialHands State
//!
//! Durable control-plane state shared by the API, the scheduler and workers.
//!
//! ## Layers
//!
//! - [`Database`]: one SQLite file shared by every store of a process
//! - [`SettingsStore`]: untyped key-value persistence
//! - [`ControlStore`]: typed accessors over [`StateKey`]s

pub mod control;
pub mod database;
pub mod error;
pub mod keys;
pub mod store;

pub use control::{ControlStore, Snapshot};
pub use database::Database;
pub use error::StateError;
pub use keys::{AgentMode, StateKey, TaskConfiguration, WorkerHeartbeat};
pub use store::{MemorySettingsStore, SettingsStore, SqliteSettingsStore};
