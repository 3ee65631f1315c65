//! Timeline Query handlers (spec SS4.I, SS6).

use axum::extract::{Path, Query, State};
use axum::Json;
use studio_auth::AuthUser;
use studio_common::cursor::Cursor;
use studio_common::{Error, Result};
use uuid::Uuid;

use crate::api::dto::{GenerationView, TimelineCursor, TimelineParams, TimelineResponse};
use crate::api::state::GenerationsState;

/// Loads the output uploads for a generation's `aiMetadata.imageIds`, empty
/// for anything that isn't `completed`.
async fn load_outputs(
    state: &GenerationsState,
    generation: &crate::domain::entities::Generation,
) -> Result<Vec<crate::domain::entities::Upload>> {
    let image_ids = generation.image_ids();
    if image_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(state.uploads.get_many(&image_ids).await?)
}

/// `GET /api/generate/queue/{generationId}` — single generation status.
pub async fn get_queue_status(
    AuthUser(ctx): AuthUser,
    State(state): State<GenerationsState>,
    Path(generation_id): Path<Uuid>,
) -> Result<Json<GenerationView>> {
    let generation = state
        .repo
        .get_by_id(generation_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("generation {} not found", generation_id)))?;

    if !ctx.owns(generation.user_id) && !ctx.is_admin() {
        return Err(Error::Authorization(
            "generation is not owned by the requesting user".to_string(),
        ));
    }

    let outputs = load_outputs(&state, &generation).await?;
    Ok(Json(GenerationView::from_generation(generation, outputs)))
}

/// `GET /api/generate/my-queue` — in-flight only (spec SS4.D `GetUserQueue`).
pub async fn get_my_queue(
    AuthUser(ctx): AuthUser,
    State(state): State<GenerationsState>,
) -> Result<Json<Vec<GenerationView>>> {
    let rows = state.repo.get_user_queue(ctx.user.id).await?;
    let mut views = Vec::with_capacity(rows.len());
    for generation in rows {
        let outputs = load_outputs(&state, &generation).await?;
        views.push(GenerationView::from_generation(generation, outputs));
    }
    Ok(Json(views))
}

/// `GET /api/generate/my-generations` — unified cursor-paginated timeline.
pub async fn get_my_generations(
    AuthUser(ctx): AuthUser,
    State(state): State<GenerationsState>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<TimelineResponse>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let cursor = params.cursor.as_deref().map(Cursor::decode).transpose()?;

    let rows = state
        .repo
        .get_timeline(ctx.user.id, limit, cursor, params.include_failed)
        .await?;

    let has_more = rows.len() as i64 == limit;
    let next = rows
        .last()
        .filter(|_| has_more)
        .map(|last| Cursor::new(last.created_at, last.id).encode());

    let mut results = Vec::with_capacity(rows.len());
    for generation in rows {
        let outputs = load_outputs(&state, &generation).await?;
        results.push(GenerationView::from_generation(generation, outputs));
    }

    Ok(Json(TimelineResponse {
        results,
        cursor: TimelineCursor { next, has_more },
    }))
}
