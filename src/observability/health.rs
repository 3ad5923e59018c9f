//! # Health Checking
//!
//! Health reporting shared by components that can be probed, such as the
//! configuration manager.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// Health status for a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is healthy and operational
    Healthy,
    /// Component is degraded but still functional
    Degraded { message: String },
    /// Component is unhealthy and not functional
    Unhealthy { message: String },
}

impl HealthStatus {
    /// Check if the status is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Check if the status is operational (healthy or degraded)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded { message } | HealthStatus::Unhealthy { message } => {
                Some(message)
            }
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub metadata: HashMap<String, String>,
}

impl HealthCheck {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            last_check: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Healthy)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            component,
            HealthStatus::Degraded {
                message: message.into(),
            },
        )
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            component,
            HealthStatus::Unhealthy {
                message: message.into(),
            },
        )
    }

    /// Add metadata to the health check
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Component that provides health checking functionality
#[async_trait]
pub trait HealthProvider: Send + Sync {
    /// Perform a health check for this component
    async fn health_check(&self) -> HealthCheck;
}
