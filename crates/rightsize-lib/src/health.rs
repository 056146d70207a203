//! Health tracking for the admission webhook
//!
//! Feeds the Kubernetes liveness and readiness probes. A failing statistics
//! backend only degrades health: pods are still admitted unmodified, so the
//! webhook stays ready.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but admitting pods without adjustment
    Degraded,
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failures since the last success
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const STATS_BACKEND: &str = "stats_backend";
    pub const ADMISSION: &str = "admission";
}

#[derive(Debug, Default)]
struct HealthState {
    ready: bool,
    components: HashMap<String, ComponentHealth>,
}

/// Shared registry of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record a successful operation, resetting the failure streak
    pub async fn record_success(&self, name: &str) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record a failed operation; the component becomes degraded
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let entry = state
            .components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::healthy);

        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.message = Some(message.into());
        entry.last_check_timestamp = chrono::Utc::now().timestamp();
        if entry.status == ComponentStatus::Healthy {
            entry.status = ComponentStatus::Degraded;
        }
    }

    /// Mark a component as failed outright
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let entry = state
            .components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::healthy);

        entry.status = ComponentStatus::Unhealthy;
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.message = Some(message.into());
        entry.last_check_timestamp = chrono::Utc::now().timestamp();
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once initialized and while no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.ready {
            Some("Webhook not yet initialized".to_string())
        } else if HealthResponse::compute_status(&state.components) == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_failures_degrade_and_success_recovers() {
        let registry = HealthRegistry::new();
        registry.register(components::STATS_BACKEND).await;
        registry.set_ready(true).await;

        registry
            .record_failure(components::STATS_BACKEND, "HTTP 503")
            .await;
        registry
            .record_failure(components::STATS_BACKEND, "HTTP 503")
            .await;

        let health = registry.health().await;
        let backend = &health.components[components::STATS_BACKEND];
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(backend.consecutive_failures, 2);
        assert_eq!(backend.message.as_deref(), Some("HTTP 503"));
        // Degraded still admits pods
        assert!(registry.readiness().await.ready);

        registry.record_success(components::STATS_BACKEND).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components[components::STATS_BACKEND].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::ADMISSION).await;
        registry.register(components::STATS_BACKEND).await;
        registry.set_ready(true).await;
        registry
            .record_failure(components::STATS_BACKEND, "timeout")
            .await;
        registry
            .set_unhealthy(components::ADMISSION, "worker panicked")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Critical component unhealthy"));
    }
}
