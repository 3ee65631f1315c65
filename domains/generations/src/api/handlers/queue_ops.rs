//! Operational endpoints over the Job Queue (spec SS6: `/api/queue/metrics`,
//! `/api/queue/health`).

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use studio_common::{Error, Result};

use crate::api::state::GenerationsState;

const QUEUE_NAME: &str = "image-generation";

#[derive(Debug, Serialize)]
pub struct QueueMetricsResponse {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

pub async fn queue_metrics(
    State(state): State<GenerationsState>,
) -> Result<Json<QueueMetricsResponse>> {
    let metrics = state
        .queue
        .metrics(QUEUE_NAME)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(Json(QueueMetricsResponse {
        waiting: metrics.waiting,
        active: metrics.active,
        completed: metrics.completed,
        failed: metrics.failed,
    }))
}

#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub healthy: bool,
}

/// Liveness over the durable queue: reachable and responding to a
/// metrics query. Distinct from `/health` (process liveness).
pub async fn queue_health(
    State(state): State<GenerationsState>,
) -> Result<Json<QueueHealthResponse>> {
    let healthy = state.queue.metrics(QUEUE_NAME).await.is_ok();
    Ok(Json(QueueHealthResponse { healthy }))
}
