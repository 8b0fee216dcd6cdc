//! Typed keys for control-plane state.
//!
//! A [`StateKey`] binds a storage key name to the value type stored under
//! it, so call sites cannot read a key with the wrong shape.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A storage key carrying the type of its value.
pub struct StateKey<T> {
    name: Cow<'static, str>,
    _value: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    /// A key with a fixed name.
    pub const fn fixed(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _value: PhantomData,
        }
    }

    /// A key whose name is computed at runtime (e.g. date-scoped keys).
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> std::fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

/// Map of task identifier to enabled flag.
pub type TaskConfiguration = BTreeMap<String, bool>;

/// Whether the scheduler promotes slots on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Scheduled slots are promoted into jobs.
    #[default]
    Autonomous,
    /// Only operator-submitted jobs run.
    Manual,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Autonomous => "autonomous",
            AgentMode::Manual => "manual",
        }
    }
}

impl std::str::FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autonomous" => Ok(AgentMode::Autonomous),
            "manual" => Ok(AgentMode::Manual),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Last liveness signal written by a worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub jobs_processed: u64,
}

pub const DISPATCHER_ACTIVE: StateKey<bool> = StateKey::fixed("dispatcher:active");
pub const AGENT_MODE: StateKey<AgentMode> = StateKey::fixed("agent:mode");
pub const TASK_CONFIGURATION: StateKey<TaskConfiguration> =
    StateKey::fixed("task:configuration");
pub const WORKER_HEARTBEAT: StateKey<WorkerHeartbeat> = StateKey::fixed("worker:heartbeat");
