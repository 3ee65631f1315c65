//! Repository access for the Generation domain (spec SS4.D, SS4.I).

pub mod transactions;

use sqlx::{PgPool, Postgres, Transaction};
use studio_common::cursor::Cursor;
use studio_common::db::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{
    Generation, GenerationStatus, OperationType, OperationTypeName, PromptTemplate, Upload,
};

#[derive(Clone)]
pub struct GenerationsRepository {
    pool: PgPool,
}

impl GenerationsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Generation>, RepositoryError> {
        let row: Option<Generation> = sqlx::query_as(
            r#"
            SELECT id, user_id, project_id, operation_type_id, prompt, negative_prompt,
                   input_image_id, reference_image_id, target_image_id, reference_image_ids,
                   reference_type, prompt_template_id, model, status, progress, tokens_used,
                   error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
            FROM generations WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// In-flight-only view (spec SS4.D `GetUserQueue`, SS6
    /// `/api/generate/my-queue`): `pending` and `processing` rows, oldest
    /// first so the UI shows submission order.
    pub async fn get_user_queue(&self, user_id: Uuid) -> Result<Vec<Generation>, RepositoryError> {
        let rows: Vec<Generation> = sqlx::query_as(
            r#"
            SELECT id, user_id, project_id, operation_type_id, prompt, negative_prompt,
                   input_image_id, reference_image_id, target_image_id, reference_image_ids,
                   reference_type, prompt_template_id, model, status, progress, tokens_used,
                   error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
            FROM generations
            WHERE user_id = $1 AND status IN ('pending', 'processing')
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Unified cursor-paginated timeline (spec SS4.I): `createdAt desc, id
    /// desc`, optionally including terminal `failed` rows.
    pub async fn get_timeline(
        &self,
        user_id: Uuid,
        limit: i64,
        cursor: Option<Cursor>,
        include_failed: bool,
    ) -> Result<Vec<Generation>, RepositoryError> {
        let (created_at, id) = match cursor {
            Some(c) => (Some(c.created_at), Some(c.id)),
            None => (None, None),
        };

        let rows: Vec<Generation> = sqlx::query_as(
            r#"
            SELECT id, user_id, project_id, operation_type_id, prompt, negative_prompt,
                   input_image_id, reference_image_id, target_image_id, reference_image_ids,
                   reference_type, prompt_template_id, model, status, progress, tokens_used,
                   error_message, processing_time_ms, metadata, ai_metadata, created_at, completed_at
            FROM generations
            WHERE user_id = $1
              AND (status <> 'failed' OR $2)
              AND ($3::timestamptz IS NULL OR (created_at, id) < ($3, $4))
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(user_id)
        .bind(include_failed)
        .bind(created_at)
        .bind(id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct OperationTypeRepository {
    pool: PgPool,
}

impl OperationTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<OperationType>, RepositoryError> {
        let row: Option<OperationType> = sqlx::query_as(
            "SELECT id, name, tokens_per_operation, is_active, description FROM operation_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_name(
        &self,
        name: OperationTypeName,
    ) -> Result<Option<OperationType>, RepositoryError> {
        let row: Option<OperationType> = sqlx::query_as(
            "SELECT id, name, tokens_per_operation, is_active, description FROM operation_types WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Catalog endpoint (spec SS6 `GET /api/generate/operations`).
    pub async fn list_active(&self) -> Result<Vec<OperationType>, RepositoryError> {
        let rows: Vec<OperationType> = sqlx::query_as(
            "SELECT id, name, tokens_per_operation, is_active, description FROM operation_types WHERE is_active ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct PromptTemplateRepository {
    pool: PgPool,
}

impl PromptTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_active_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<PromptTemplate>, RepositoryError> {
        let row: Option<PromptTemplate> = sqlx::query_as(
            "SELECT id, name, prompt, is_active FROM prompt_templates WHERE id = $1 AND is_active",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Clone)]
pub struct UploadRepository {
    pool: PgPool,
}

impl UploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an upload by id regardless of owner. Used by the worker,
    /// which already trusts the ids recorded on a validated `Generation`
    /// row; ownership is enforced once, at intake.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Upload>, RepositoryError> {
        let row: Option<Upload> = sqlx::query_as(
            r#"
            SELECT id, user_id, purpose, mime_type, size_bytes, storage_provider,
                   storage_bucket, storage_key, public_url, title, created_at
            FROM uploads WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Fetch an upload only if owned by `user_id` (spec SS4.G step 3:
    /// "an existing `uploadId` owned by `userId`").
    pub async fn get_owned(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Upload>, RepositoryError> {
        let row: Option<Upload> = sqlx::query_as(
            r#"
            SELECT id, user_id, purpose, mime_type, size_bytes, storage_provider,
                   storage_bucket, storage_key, public_url, title, created_at
            FROM uploads WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Batch-load outputs for a completed generation's `aiMetadata.imageIds`
    /// (spec SS4.I `GenerationView.images`), preserving no particular order
    /// — callers re-key by id if display order matters.
    pub async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Upload>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<Upload> = sqlx::query_as(
            r#"
            SELECT id, user_id, purpose, mime_type, size_bytes, storage_provider,
                   storage_bucket, storage_key, public_url, title, created_at
            FROM uploads WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Cleanup-on-validation-failure contract (spec SS4.G step 3): deletes
    /// an `Upload` row this same intake call just wrote, when a later
    /// validation step in the same request fails.
    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
