//! Intake Controller handlers (spec SS4.G): one per operation endpoint,
//! sharing the validate → resolve inputs → create pending row → enqueue
//! → 202 skeleton.

use axum::extract::State;
use axum::Json;
use sqlx::{Postgres, Transaction};
use studio_auth::AuthUser;
use studio_common::{Error, Result, ValidatedJson};
use studio_queue::{EnqueueOptions, Priority};
use studio_storage::UploadPurpose as StorageUploadPurpose;
use uuid::Uuid;

use crate::api::dto::{
    ImageInputDto, ImageMultipleReferenceRequest, ImageReferenceRequest, IntakeResponse,
    TextToImageRequest, WebsocketEvents,
};
use crate::api::state::GenerationsState;
use crate::domain::entities::{GenerationStatus, NewGeneration, OperationTypeName, UploadPurpose};
use crate::domain::ImageInput;
use crate::repository::transactions as repo_tx;
use crate::worker::GenerationJobPayload;

const QUEUE_NAME: &str = "image-generation";

fn enqueue_options() -> EnqueueOptions {
    // spec SS4.G step 5: priority=3, attempts=3, backoff=exponential(2000ms).
    EnqueueOptions {
        priority: Priority::Normal,
        attempts: 3,
        backoff_ms: 2000,
        ..Default::default()
    }
}

/// Resolve one `ImageInputDto` to a persisted upload id, tracking any
/// newly-created `Upload` row in `created` so the caller can clean it up
/// on a later validation failure (spec SS4.G step 3's cleanup contract).
async fn resolve_image_input(
    state: &GenerationsState,
    user_id: Uuid,
    input: ImageInputDto,
    created: &mut Vec<Uuid>,
) -> Result<Uuid> {
    match input.into_domain().map_err(Error::Validation)? {
        ImageInput::Uploaded { upload_id } => {
            let upload = state
                .uploads
                .get_owned(upload_id, user_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("upload {} not found", upload_id)))?;
            Ok(upload.id)
        }
        ImageInput::Fresh { bytes, mime, filename } => {
            let outcome = state
                .storage
                .put(user_id, StorageUploadPurpose::Reference, bytes, &mime, &filename)
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;

            let mut tx = state.repo.begin().await?;
            let upload = repo_tx::insert_upload_tx(
                &mut tx,
                user_id,
                UploadPurpose::Reference,
                &mime,
                outcome.size_bytes,
                &outcome.storage_provider,
                &outcome.storage_bucket,
                &outcome.storage_key,
                &outcome.public_url,
                Some(&filename),
            )
            .await?;
            tx.commit().await?;

            created.push(upload.id);
            Ok(upload.id)
        }
    }
}

async fn cleanup_on_failure(state: &GenerationsState, created: &[Uuid]) {
    for id in created {
        if let Err(err) = state.uploads.delete(*id).await {
            tracing::warn!(upload_id = %id, error = %err, "failed to clean up upload after validation failure");
        }
    }
}

fn base_metadata(
    prompt: &str,
    number_of_images: i32,
    aspect_ratio: Option<&str>,
    project_id: Option<Uuid>,
    prompt_template_id: Option<Uuid>,
) -> serde_json::Value {
    serde_json::json!({
        "prompt": prompt,
        "numberOfImages": number_of_images,
        "aspectRatio": aspect_ratio,
        "projectId": project_id,
        "promptTemplateId": prompt_template_id,
        "originalPrompt": prompt,
    })
}

async fn create_and_enqueue(
    state: &GenerationsState,
    user_id: Uuid,
    new: NewGeneration,
    job_type: &str,
) -> Result<IntakeResponse> {
    let mut tx: Transaction<'_, Postgres> = state.repo.begin().await?;
    let generation = repo_tx::create_generation_tx(&mut tx, new).await?;
    tx.commit().await?;

    let payload = serde_json::to_value(GenerationJobPayload {
        generation_id: generation.id,
        user_id,
    })
    .map_err(Error::Serialization)?;

    let job_id = state
        .queue
        .enqueue(QUEUE_NAME, job_type, payload, enqueue_options())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    tracing::info!(generation_id = %generation.id, job_id = %job_id, job_type, "generation enqueued");

    Ok(IntakeResponse {
        job_id,
        generation_id: generation.id,
        status: GenerationStatus::Pending,
        websocket_events: WebsocketEvents::default(),
    })
}

pub async fn text_to_image(
    AuthUser(ctx): AuthUser,
    State(state): State<GenerationsState>,
    ValidatedJson(req): ValidatedJson<TextToImageRequest>,
) -> Result<(axum::http::StatusCode, Json<IntakeResponse>)> {
    let operation_type = state
        .operation_types
        .get_by_name(OperationTypeName::TextToImage)
        .await?
        .ok_or_else(|| Error::Internal("text_to_image operation type not registered".to_string()))?;

    let number_of_images = req.number_of_images.unwrap_or(1);
    let metadata = base_metadata(
        &req.prompt,
        number_of_images,
        req.aspect_ratio.as_ref().map(|a| a.as_str()),
        req.project_id,
        req.prompt_template_id,
    );

    let new = NewGeneration {
        user_id: ctx.user.id,
        project_id: req.project_id,
        operation_type_id: operation_type.id,
        prompt: req.prompt,
        negative_prompt: req.negative_prompt,
        input_image_id: None,
        reference_image_id: None,
        target_image_id: None,
        reference_image_ids: None,
        reference_type: None,
        prompt_template_id: req.prompt_template_id,
        model: crate::domain::entities::DEFAULT_MODEL.to_string(),
        metadata,
    };

    let response = create_and_enqueue(&state, ctx.user.id, new, "text_to_image").await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}

pub async fn image_reference(
    AuthUser(ctx): AuthUser,
    State(state): State<GenerationsState>,
    ValidatedJson(req): ValidatedJson<ImageReferenceRequest>,
) -> Result<(axum::http::StatusCode, Json<IntakeResponse>)> {
    let operation_type = state
        .operation_types
        .get_by_name(OperationTypeName::ImageReference)
        .await?
        .ok_or_else(|| Error::Internal("image_reference operation type not registered".to_string()))?;

    let mut created_uploads = Vec::new();
    let reference_image_id =
        match resolve_image_input(&state, ctx.user.id, req.reference, &mut created_uploads).await {
            Ok(id) => id,
            Err(err) => {
                cleanup_on_failure(&state, &created_uploads).await;
                return Err(err);
            }
        };

    let number_of_images = req.number_of_images.unwrap_or(1);
    let metadata = base_metadata(
        &req.prompt,
        number_of_images,
        req.aspect_ratio.as_ref().map(|a| a.as_str()),
        req.project_id,
        req.prompt_template_id,
    );

    let new = NewGeneration {
        user_id: ctx.user.id,
        project_id: req.project_id,
        operation_type_id: operation_type.id,
        prompt: req.prompt,
        negative_prompt: req.negative_prompt,
        input_image_id: None,
        reference_image_id: Some(reference_image_id),
        target_image_id: None,
        reference_image_ids: None,
        reference_type: Some(req.reference_type),
        prompt_template_id: req.prompt_template_id,
        model: crate::domain::entities::DEFAULT_MODEL.to_string(),
        metadata,
    };

    let response = create_and_enqueue(&state, ctx.user.id, new, "image_reference").await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}

pub async fn image_multiple_reference(
    AuthUser(ctx): AuthUser,
    State(state): State<GenerationsState>,
    ValidatedJson(req): ValidatedJson<ImageMultipleReferenceRequest>,
) -> Result<(axum::http::StatusCode, Json<IntakeResponse>)> {
    let operation_type = state
        .operation_types
        .get_by_name(OperationTypeName::ImageMultipleReference)
        .await?
        .ok_or_else(|| {
            Error::Internal("image_multiple_reference operation type not registered".to_string())
        })?;

    let mut created_uploads = Vec::new();

    let target_image_id =
        match resolve_image_input(&state, ctx.user.id, req.target, &mut created_uploads).await {
            Ok(id) => id,
            Err(err) => {
                cleanup_on_failure(&state, &created_uploads).await;
                return Err(err);
            }
        };

    let mut reference_image_ids = Vec::with_capacity(req.references.len());
    for reference in req.references {
        match resolve_image_input(&state, ctx.user.id, reference, &mut created_uploads).await {
            Ok(id) => reference_image_ids.push(id),
            Err(err) => {
                cleanup_on_failure(&state, &created_uploads).await;
                return Err(err);
            }
        }
    }

    let number_of_images = req.number_of_images.unwrap_or(1);
    let metadata = base_metadata(
        &req.prompt,
        number_of_images,
        req.aspect_ratio.as_ref().map(|a| a.as_str()),
        req.project_id,
        req.prompt_template_id,
    );

    let new = NewGeneration {
        user_id: ctx.user.id,
        project_id: req.project_id,
        operation_type_id: operation_type.id,
        prompt: req.prompt,
        negative_prompt: req.negative_prompt,
        input_image_id: None,
        reference_image_id: None,
        target_image_id: Some(target_image_id),
        reference_image_ids: Some(reference_image_ids),
        reference_type: Some(req.reference_type),
        prompt_template_id: req.prompt_template_id,
        model: crate::domain::entities::DEFAULT_MODEL.to_string(),
        metadata,
    };

    let response = create_and_enqueue(&state, ctx.user.id, new, "image_multiple_reference").await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}
