use crate::common::ApiResponse;
use crate::lifecycle::{ComponentHealth, HealthRegistry, HealthStatus};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Router serving `GET /health`
pub fn health_router(health: Arc<HealthRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(health)
}

/// 200 while every component is healthy, starting or degraded; 503 once any failed.
async fn health_handler(State(health): State<Arc<HealthRegistry>>) -> ApiResponse<HealthReport> {
    let report = HealthReport {
        status: health.overall(),
        components: health.snapshot(),
    };
    if health.is_serving() {
        ApiResponse::success(report)
    } else {
        ApiResponse::success(report).with_status(StatusCode::SERVICE_UNAVAILABLE)
    }
}
