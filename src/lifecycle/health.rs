//! Component health tracking
//!
//! Resources and init hooks report their outcome here; the `/health` endpoint
//! reads the aggregate.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Starting,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Shared map of component name to its last reported health.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    components: DashMap<String, ComponentHealth>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, component: &str, status: HealthStatus, detail: Option<String>) {
        tracing::debug!("Health of '{}' is now {}", component, status);
        self.components
            .insert(component.to_string(), ComponentHealth { status, detail });
    }

    pub fn mark_healthy(&self, component: &str) {
        self.report(component, HealthStatus::Healthy, None);
    }

    pub fn mark_degraded(&self, component: &str, detail: impl Into<String>) {
        self.report(component, HealthStatus::Degraded, Some(detail.into()));
    }

    pub fn mark_failed(&self, component: &str, detail: impl Into<String>) {
        self.report(component, HealthStatus::Failed, Some(detail.into()));
    }

    pub fn get(&self, component: &str) -> Option<ComponentHealth> {
        self.components.get(component).map(|entry| entry.clone())
    }

    /// Sorted copy of every component's health.
    pub fn snapshot(&self) -> BTreeMap<String, ComponentHealth> {
        self.components
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// The worst status reported by any component, `Healthy` when empty.
    pub fn overall(&self) -> HealthStatus {
        self.components
            .iter()
            .map(|entry| entry.value().status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    /// False once any component has failed.
    pub fn is_serving(&self) -> bool {
        self.overall() != HealthStatus::Failed
    }
}
