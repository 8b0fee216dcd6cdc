//! Component health folding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is reachable and a worker is alive.
    Healthy,
    /// Functional, but something needs attention.
    Degraded,
    /// The control plane cannot serve its state.
    Unhealthy,
}

impl HealthStatus {
    /// Combine two statuses, keeping the worse one.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if self == HealthStatus::Unhealthy || other == HealthStatus::Unhealthy {
            HealthStatus::Unhealthy
        } else if self == HealthStatus::Degraded || other == HealthStatus::Degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Overall status of a component set.
    pub fn overall(components: &BTreeMap<String, ComponentHealth>) -> HealthStatus {
        components
            .values()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst)
    }
}

/// Component health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            details: None,
        }
    }

    pub fn degraded(details: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            details: Some(details.into()),
        }
    }

    pub fn unhealthy(details: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            details: Some(details.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_empty_is_healthy() {
        assert_eq!(HealthStatus::overall(&BTreeMap::new()), HealthStatus::Healthy);
    }

    #[test]
    fn test_overall_degraded() {
        let mut components = BTreeMap::new();
        components.insert("database".to_string(), ComponentHealth::healthy());
        components.insert("worker".to_string(), ComponentHealth::degraded("no heartbeat"));
        assert_eq!(HealthStatus::overall(&components), HealthStatus::Degraded);
    }

    #[test]
    fn test_overall_unhealthy_wins() {
        let mut components = BTreeMap::new();
        components.insert("database".to_string(), ComponentHealth::unhealthy("down"));
        components.insert("worker".to_string(), ComponentHealth::degraded("stale"));
        assert_eq!(HealthStatus::overall(&components), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ComponentHealth::degraded("stale")).unwrap();
        assert_eq!(json, r#"{"status":"degraded","details":"stale"}"#);
        let json = serde_json::to_string(&ComponentHealth::healthy()).unwrap();
        assert_eq!(json, r#"{"status":"healthy"}"#);
    }
}
