//! Typed control-plane state.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::StateError;
use crate::keys::{
    AGENT_MODE, AgentMode, DISPATCHER_ACTIVE, StateKey, TASK_CONFIGURATION, TaskConfiguration,
    WORKER_HEARTBEAT, WorkerHeartbeat,
};
use crate::store::SettingsStore;

/// A decoded value with the stored document it was read from.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub value: T,
    pub raw: Value,
}

/// Named accessors for the persisted control flags.
///
/// Store failures always propagate; only a key that was never written falls
/// back to its documented default.
#[derive(Clone)]
pub struct ControlStore {
    settings: Arc<dyn SettingsStore>,
}

impl ControlStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Read a typed value.
    pub async fn load<T: DeserializeOwned>(
        &self,
        key: &StateKey<T>,
    ) -> Result<Option<T>, StateError> {
        match self.settings.get(key.name()).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StateError::InvalidValue {
                    key: key.name().to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Read a typed value along with its stored form, for [`Self::save_if`].
    pub async fn load_snapshot<T: DeserializeOwned>(
        &self,
        key: &StateKey<T>,
    ) -> Result<Option<Snapshot<T>>, StateError> {
        let Some(raw) = self.settings.get(key.name()).await? else {
            return Ok(None);
        };
        let value = serde_json::from_value(raw.clone()).map_err(|e| StateError::InvalidValue {
            key: key.name().to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(Snapshot { value, raw }))
    }

    /// Write `value` only if the stored form is still `expected` (`None`:
    /// the key must be absent).
    ///
    /// Returns the new stored form, or `None` when another writer got there
    /// first.
    pub async fn save_if<T: Serialize>(
        &self,
        key: &StateKey<T>,
        expected: Option<&Value>,
        value: &T,
    ) -> Result<Option<Value>, StateError> {
        let raw = serde_json::to_value(value)?;
        let swapped = self
            .settings
            .compare_and_swap(key.name(), expected, raw.clone())
            .await?;
        Ok(swapped.then_some(raw))
    }

    /// Write a typed value.
    pub async fn save<T: Serialize>(&self, key: &StateKey<T>, value: &T) -> Result<(), StateError> {
        let value = serde_json::to_value(value)?;
        self.settings.upsert(key.name(), value).await
    }

    /// Remove a key.
    pub async fn remove<T>(&self, key: &StateKey<T>) -> Result<(), StateError> {
        self.settings.delete(key.name()).await
    }

    /// Whether new claims are allowed. Never written means paused.
    pub async fn dispatcher_active(&self) -> Result<bool, StateError> {
        Ok(self.load(&DISPATCHER_ACTIVE).await?.unwrap_or(false))
    }

    pub async fn set_dispatcher_active(&self, active: bool) -> Result<(), StateError> {
        debug!("dispatcher:active <- {}", active);
        self.save(&DISPATCHER_ACTIVE, &active).await
    }

    pub async fn agent_mode(&self) -> Result<AgentMode, StateError> {
        Ok(self.load(&AGENT_MODE).await?.unwrap_or_default())
    }

    pub async fn set_agent_mode(&self, mode: AgentMode) -> Result<(), StateError> {
        self.save(&AGENT_MODE, &mode).await
    }

    /// Persisted task configuration, `None` until first seeded.
    pub async fn task_configuration(&self) -> Result<Option<TaskConfiguration>, StateError> {
        self.load(&TASK_CONFIGURATION).await
    }

    pub async fn set_task_configuration(
        &self,
        config: &TaskConfiguration,
    ) -> Result<(), StateError> {
        self.save(&TASK_CONFIGURATION, config).await
    }

    pub async fn clear_task_configuration(&self) -> Result<(), StateError> {
        self.remove(&TASK_CONFIGURATION).await
    }

    pub async fn heartbeat(&self) -> Result<Option<WorkerHeartbeat>, StateError> {
        self.load(&WORKER_HEARTBEAT).await
    }

    /// Record a beat for `worker_id` at the current time.
    pub async fn record_heartbeat(
        &self,
        worker_id: &str,
        jobs_processed: u64,
    ) -> Result<WorkerHeartbeat, StateError> {
        let beat = WorkerHeartbeat {
            worker_id: worker_id.to_string(),
            last_seen: Utc::now(),
            jobs_processed,
        };
        self.save(&WORKER_HEARTBEAT, &beat).await?;
        Ok(beat)
    }

    /// Connectivity probe of the backing store.
    pub async fn ping(&self) -> Result<(), StateError> {
        self.settings.ping().await
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
