//! Route definitions for the Generation Pipeline API (spec SS6).

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{intake, operations, queue_ops, timeline};
use super::state::GenerationsState;

pub fn routes() -> Router<GenerationsState> {
    Router::new()
        .route("/api/generate/operations", get(operations::list_operations))
        .route("/api/generate/text-to-image", post(intake::text_to_image))
        .route("/api/generate/image-reference", post(intake::image_reference))
        .route(
            "/api/generate/image-multiple-reference",
            post(intake::image_multiple_reference),
        )
        .route("/api/generate/queue/{generation_id}", get(timeline::get_queue_status))
        .route("/api/generate/my-queue", get(timeline::get_my_queue))
        .route("/api/generate/my-generations", get(timeline::get_my_generations))
        .route("/api/queue/metrics", get(queue_ops::queue_metrics))
        .route("/api/queue/health", get(queue_ops::queue_health))
}
