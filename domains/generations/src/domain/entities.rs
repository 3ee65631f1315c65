//! Generation domain entities (spec SS3): `Generation`, `OperationType`,
//! `PromptTemplate`, `Upload`. Grounded on `domains/jobs/src/domain/
//! entities.rs`'s `Job` struct for the state-machine-driven mutator shape
//! (`start()`/`complete()`/`fail()`/`cancel()`); the percentage
//! `calculate_refund()` logic that entity carries is deliberately not
//! ported — this spec charges tokens only on success and never partially
//! refunds (spec SS7: "workers never charge on failure").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::state::{GenerationEvent, GenerationState, GenerationStateMachine, StateError};

/// Generation status, persisted as a Postgres enum. Mirrors
/// `GenerationState` one-to-one; kept as a distinct type because the
/// state machine operates on a plain enum while this one carries the
/// `sqlx`/`serde` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "generation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn to_state(self) -> GenerationState {
        match self {
            Self::Pending => GenerationState::Pending,
            Self::Processing => GenerationState::Processing,
            Self::Completed => GenerationState::Completed,
            Self::Failed => GenerationState::Failed,
            Self::Cancelled => GenerationState::Cancelled,
        }
    }

    pub fn from_state(state: GenerationState) -> Self {
        match state {
            GenerationState::Pending => Self::Pending,
            GenerationState::Processing => Self::Processing,
            GenerationState::Completed => Self::Completed,
            GenerationState::Failed => Self::Failed,
            GenerationState::Cancelled => Self::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.to_state().is_terminal()
    }
}

/// Name of a registered operation type (spec SS3 `OperationType.name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_type_name", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationTypeName {
    TextToImage,
    ImageReference,
    ImageMultipleReference,
}

impl OperationTypeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "text_to_image",
            Self::ImageReference => "image_reference",
            Self::ImageMultipleReference => "image_multiple_reference",
        }
    }
}

/// Admin-managed catalog row (spec SS3 `OperationType`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OperationType {
    pub id: Uuid,
    pub name: OperationTypeName,
    pub tokens_per_operation: i32,
    pub is_active: bool,
    pub description: String,
}

impl OperationType {
    /// `tokensPerOperation x numberOfImages` (spec SS3, SS4.F step 2).
    pub fn cost_for(&self, number_of_images: i32) -> i64 {
        self.tokens_per_operation as i64 * number_of_images as i64
    }
}

/// Optional styling layer (spec SS3 `PromptTemplate`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
    pub is_active: bool,
}

/// What a stored blob is for (spec SS3 `Upload.purpose`). Distinct from
/// `studio_storage::UploadPurpose` (the facade's non-persisted marker)
/// because this one carries the `sqlx`/`serde` DB mapping for the
/// `uploads` table this domain owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "upload_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UploadPurpose {
    Init,
    Mask,
    Reference,
    Attachment,
    GenerationOutput,
}

impl From<UploadPurpose> for studio_storage::UploadPurpose {
    fn from(value: UploadPurpose) -> Self {
        match value {
            UploadPurpose::Init => studio_storage::UploadPurpose::Init,
            UploadPurpose::Mask => studio_storage::UploadPurpose::Mask,
            UploadPurpose::Reference => studio_storage::UploadPurpose::Reference,
            UploadPurpose::Attachment => studio_storage::UploadPurpose::Attachment,
            UploadPurpose::GenerationOutput => studio_storage::UploadPurpose::GenerationOutput,
        }
    }
}

/// A persisted blob reference (spec SS3 `Upload`). Immutable after insert;
/// owned by its creating user. The object store facade (`studio_storage`)
/// never touches this table itself — it returns a `PutOutcome` and the
/// caller (intake controller or worker) persists the row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Upload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: UploadPurpose,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_provider: String,
    pub storage_bucket: String,
    pub storage_key: String,
    pub public_url: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How a generation's output is to be applied to a reference image (spec
/// SS3 `Generation.referenceType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reference_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Subject,
    Face,
    FullImage,
}

impl ReferenceType {
    /// Instruction injected into the effective prompt for `image_reference`
    /// generations (spec SS4.F step 5).
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            Self::Subject => "Preserve the subject's identity and distinguishing features from the reference image.",
            Self::Face => "Preserve the facial identity from the reference image exactly.",
            Self::FullImage => "Use the full reference image as the basis for composition and style.",
        }
    }
}

/// One request for N images (spec SS3 `Generation`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Generation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub operation_type_id: Uuid,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub input_image_id: Option<Uuid>,
    pub reference_image_id: Option<Uuid>,
    pub target_image_id: Option<Uuid>,
    pub reference_image_ids: Option<Vec<Uuid>>,
    pub reference_type: Option<ReferenceType>,
    pub prompt_template_id: Option<Uuid>,
    pub model: String,
    pub status: GenerationStatus,
    pub progress: i32,
    pub tokens_used: i64,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub metadata: Json<serde_json::Value>,
    pub ai_metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

impl Generation {
    /// Extracts `metadata.numberOfImages` (request-side field set at
    /// intake, spec SS3 `Generation.metadata`).
    pub fn number_of_images(&self) -> i32 {
        self.metadata
            .0
            .get("numberOfImages")
            .and_then(|v| v.as_i64())
            .unwrap_or(1) as i32
    }

    /// Extracts `aiMetadata.imageIds` (response-side field, spec SS3).
    pub fn image_ids(&self) -> Vec<Uuid> {
        self.ai_metadata
            .0
            .get("imageIds")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Guard-checked transition helper mirroring the teacher's
    /// `Job::start()`/`complete()`/`fail()`/`cancel()` shape. Callers use
    /// this to validate a transition in memory before writing it; the
    /// actual persistence happens in `repository::transactions`.
    pub fn checked_transition(&self, event: GenerationEvent) -> Result<GenerationStatus, StateError> {
        let next = GenerationStateMachine::transition(self.status.to_state(), event)?;
        Ok(GenerationStatus::from_state(next))
    }
}

/// Inputs for `repository::transactions::create_generation_tx` (spec SS4.D
/// `Create`). Mirrors `LedgerMutationOptions`'s role as a named-args
/// bundle rather than a long positional parameter list.
#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub operation_type_id: Uuid,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub input_image_id: Option<Uuid>,
    pub reference_image_id: Option<Uuid>,
    pub target_image_id: Option<Uuid>,
    pub reference_image_ids: Option<Vec<Uuid>>,
    pub reference_type: Option<ReferenceType>,
    pub prompt_template_id: Option<Uuid>,
    pub model: String,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_generation(status: GenerationStatus) -> Generation {
        Generation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            project_id: None,
            operation_type_id: Uuid::new_v4(),
            prompt: "a red apple".to_string(),
            negative_prompt: None,
            input_image_id: None,
            reference_image_id: None,
            target_image_id: None,
            reference_image_ids: None,
            reference_type: None,
            prompt_template_id: None,
            model: DEFAULT_MODEL.to_string(),
            status,
            progress: 0,
            tokens_used: 0,
            error_message: None,
            processing_time_ms: None,
            metadata: Json(serde_json::json!({"numberOfImages": 2})),
            ai_metadata: Json(serde_json::json!({})),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_number_of_images_reads_metadata() {
        let generation = sample_generation(GenerationStatus::Pending);
        assert_eq!(generation.number_of_images(), 2);
    }

    #[test]
    fn test_number_of_images_defaults_to_one_when_absent() {
        let mut generation = sample_generation(GenerationStatus::Pending);
        generation.metadata = Json(serde_json::json!({}));
        assert_eq!(generation.number_of_images(), 1);
    }

    #[test]
    fn test_image_ids_parses_ai_metadata() {
        let mut generation = sample_generation(GenerationStatus::Completed);
        let id = Uuid::new_v4();
        generation.ai_metadata = Json(serde_json::json!({"imageIds": [id.to_string()]}));
        assert_eq!(generation.image_ids(), vec![id]);
    }

    #[test]
    fn test_checked_transition_pending_to_processing() {
        let generation = sample_generation(GenerationStatus::Pending);
        let next = generation.checked_transition(GenerationEvent::Dequeue).unwrap();
        assert_eq!(next, GenerationStatus::Processing);
    }

    #[test]
    fn test_checked_transition_rejects_terminal() {
        let generation = sample_generation(GenerationStatus::Completed);
        let err = generation.checked_transition(GenerationEvent::Cancel).unwrap_err();
        assert!(matches!(err, StateError::TerminalState(_)));
    }

    #[test]
    fn test_operation_type_cost_for_multiplies_by_image_count() {
        let op = OperationType {
            id: Uuid::new_v4(),
            name: OperationTypeName::ImageMultipleReference,
            tokens_per_operation: 200,
            is_active: true,
            description: "multi-reference".to_string(),
        };
        assert_eq!(op.cost_for(3), 600);
    }

    #[test]
    fn test_reference_type_instructions_differ() {
        assert_ne!(
            ReferenceType::Subject.prompt_instruction(),
            ReferenceType::Face.prompt_instruction()
        );
    }
}
