//! Transactional free functions for the Generation Repository (spec
//! SS4.D), following `domains/ledger/src/repository/transactions.rs`'s
//! lock-probe-write shape and `domains/jobs/src/repository/transactions.rs`'s
//! insert-within-transaction pattern.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use studio_common::db::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{Generation, GenerationStatus, NewGeneration, Upload, UploadPurpose};

/// Insert a new `pending` generation row (spec SS4.G step 4).
pub async fn create_generation_tx(
    transaction: &mut Transaction<'_, Postgres>,
    new: NewGeneration,
) -> Result<Generation, RepositoryError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let created: Generation = sqlx::query_as(
        r#"
        INSERT INTO generations
            (id, user_id, project_id, operation_type_id, prompt, negative_prompt,
             input_image_id, reference_image_id, target_image_id, reference_image_ids,
             reference_type, prompt_template_id, model, status, progress, tokens_used,
             error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, 0,
             NULL, NULL, $15, $16, $17, NULL)
        RETURNING id, user_id, project_id, operation_type_id, prompt, negative_prompt,
                  input_image_id, reference_image_id, target_image_id, reference_image_ids,
                  reference_type, prompt_template_id, model, status, progress, tokens_used,
                  error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
        "#,
    )
    .bind(id)
    .bind(new.user_id)
    .bind(new.project_id)
    .bind(new.operation_type_id)
    .bind(&new.prompt)
    .bind(&new.negative_prompt)
    .bind(new.input_image_id)
    .bind(new.reference_image_id)
    .bind(new.target_image_id)
    .bind(&new.reference_image_ids)
    .bind(new.reference_type)
    .bind(new.prompt_template_id)
    .bind(&new.model)
    .bind(GenerationStatus::Pending)
    .bind(Json(new.metadata))
    .bind(Json(serde_json::json!({})))
    .bind(now)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(created)
}

/// Lock a generation row `FOR UPDATE` (spec SS4.F step 1's idempotency
/// probe: the worker must observe a consistent `status` before deciding
/// whether to proceed).
pub async fn lock_generation_row_tx(
    transaction: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Generation>, RepositoryError> {
    let row: Option<Generation> = sqlx::query_as(
        r#"
        SELECT id, user_id, project_id, operation_type_id, prompt, negative_prompt,
               input_image_id, reference_image_id, target_image_id, reference_image_ids,
               reference_type, prompt_template_id, model, status, progress, tokens_used,
               error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
        FROM generations
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **transaction)
    .await?;

    Ok(row)
}

/// `UpdateStatus` (spec SS4.D): patch `status`/`progress`/`errorMessage`.
/// Used for every transition except the terminal `completed` one, which
/// goes through `attach_outputs_tx` so both mutations land atomically.
pub async fn update_status_tx(
    transaction: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: GenerationStatus,
    progress: i32,
    error_message: Option<&str>,
) -> Result<Generation, RepositoryError> {
    let completed_at = status.is_terminal().then(Utc::now);

    let updated: Generation = sqlx::query_as(
        r#"
        UPDATE generations
        SET status = $2, progress = $3, error_message = $4,
            completed_at = COALESCE($5, completed_at)
        WHERE id = $1
        RETURNING id, user_id, project_id, operation_type_id, prompt, negative_prompt,
                  input_image_id, reference_image_id, target_image_id, reference_image_ids,
                  reference_type, prompt_template_id, model, status, progress, tokens_used,
                  error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(progress)
    .bind(error_message)
    .bind(completed_at)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(updated)
}

/// `AttachOutputs` (spec SS4.D): sets `aiMetadata.imageIds`, flips
/// `status=completed`, `progress=100`, stamps `completedAt`, records
/// `tokensUsed` and `processingTimeMs`. Called in the same transaction as
/// the ledger debit (spec SS4.F step 7) so both commit together.
pub async fn attach_outputs_tx(
    transaction: &mut Transaction<'_, Postgres>,
    id: Uuid,
    image_ids: &[Uuid],
    tokens_used: i64,
    processing_time_ms: i64,
) -> Result<Generation, RepositoryError> {
    let ai_metadata = serde_json::json!({ "imageIds": image_ids });
    let now = Utc::now();

    let updated: Generation = sqlx::query_as(
        r#"
        UPDATE generations
        SET status = $2, progress = 100, tokens_used = $3, processing_time_ms = $4,
            ai_metadata = $5, completed_at = $6
        WHERE id = $1
        RETURNING id, user_id, project_id, operation_type_id, prompt, negative_prompt,
                  input_image_id, reference_image_id, target_image_id, reference_image_ids,
                  reference_type, prompt_template_id, model, status, progress, tokens_used,
                  error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
        "#,
    )
    .bind(id)
    .bind(GenerationStatus::Completed)
    .bind(tokens_used)
    .bind(processing_time_ms)
    .bind(Json(ai_metadata))
    .bind(now)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(updated)
}

/// Persist an `Upload` row the caller (intake controller or worker) has
/// already written to the Object Store Facade. The facade itself never
/// touches this table (see `studio_storage`'s module doc).
#[allow(clippy::too_many_arguments)]
pub async fn insert_upload_tx(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    purpose: UploadPurpose,
    mime_type: &str,
    size_bytes: i64,
    storage_provider: &str,
    storage_bucket: &str,
    storage_key: &str,
    public_url: &str,
    title: Option<&str>,
) -> Result<Upload, RepositoryError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let created: Upload = sqlx::query_as(
        r#"
        INSERT INTO uploads
            (id, user_id, purpose, mime_type, size_bytes, storage_provider,
             storage_bucket, storage_key, public_url, title, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, user_id, purpose, mime_type, size_bytes, storage_provider,
                  storage_bucket, storage_key, public_url, title, created_at
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(purpose)
    .bind(mime_type)
    .bind(size_bytes)
    .bind(storage_provider)
    .bind(storage_bucket)
    .bind(storage_key)
    .bind(public_url)
    .bind(title)
    .bind(now)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(created)
}
