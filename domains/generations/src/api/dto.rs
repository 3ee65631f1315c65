//! Request/response DTOs for the generation HTTP surface (spec SS6, SS4.G).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::entities::{Generation, GenerationStatus, OperationType, ReferenceType, Upload};
use crate::domain::ImageInput;

/// Aspect ratio enum (spec SS4.G step 2): `{1:1, 16:9, 9:16, 4:3, 3:4}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Widescreen => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
            Self::StandardPortrait => "3:4",
        }
    }
}

/// Wire representation of `ImageInput` (spec SS9 redesign flag): a tagged
/// union so the Intake Controller never parses ad-hoc "file OR id OR
/// both" shapes by hand.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageInputDto {
    Uploaded {
        upload_id: Uuid,
    },
    Fresh {
        /// Base64-encoded image bytes.
        data: String,
        mime: String,
        filename: String,
    },
}

impl ImageInputDto {
    pub fn into_domain(self) -> Result<ImageInput, String> {
        match self {
            ImageInputDto::Uploaded { upload_id } => Ok(ImageInput::Uploaded { upload_id }),
            ImageInputDto::Fresh { data, mime, filename } => {
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|_| "invalid base64 image data".to_string())?;
                Ok(ImageInput::Fresh { bytes, mime, filename })
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct TextToImageRequest {
    #[validate(length(min = 5, max = 4000, message = "prompt must be 5..4000 characters"))]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    #[validate(range(min = 1, max = 4, message = "numberOfImages must be 1..4"))]
    pub number_of_images: Option<i32>,
    pub project_id: Option<Uuid>,
    pub prompt_template_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImageReferenceRequest {
    #[validate(length(min = 5, max = 4000, message = "prompt must be 5..4000 characters"))]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    #[validate(range(min = 1, max = 4, message = "numberOfImages must be 1..4"))]
    pub number_of_images: Option<i32>,
    pub project_id: Option<Uuid>,
    pub prompt_template_id: Option<Uuid>,
    pub reference_type: ReferenceType,
    pub reference: ImageInputDto,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImageMultipleReferenceRequest {
    #[validate(length(min = 5, max = 4000, message = "prompt must be 5..4000 characters"))]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    #[validate(range(min = 1, max = 4, message = "numberOfImages must be 1..4"))]
    pub number_of_images: Option<i32>,
    pub project_id: Option<Uuid>,
    pub prompt_template_id: Option<Uuid>,
    pub reference_type: ReferenceType,
    pub target: ImageInputDto,
    #[validate(length(min = 1, max = 5, message = "references must total 1..5"))]
    pub references: Vec<ImageInputDto>,
}

#[derive(Debug, Serialize)]
pub struct WebsocketEvents {
    pub progress: &'static str,
    pub completed: &'static str,
    pub failed: &'static str,
}

impl Default for WebsocketEvents {
    fn default() -> Self {
        // spec SS6 intake 202 payload and the "Realtime channel" wire names
        // (underscore-separated), not `Event::name()`'s dot-separated
        // tracing labels (spec SS4.H's conceptual event catalog).
        Self {
            progress: "generation_progress",
            completed: "generation_completed",
            failed: "generation_failed",
        }
    }
}

/// 202 payload (spec SS4.G step 6, SS6).
#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub job_id: Uuid,
    pub generation_id: Uuid,
    pub status: GenerationStatus,
    pub websocket_events: WebsocketEvents,
}

#[derive(Debug, Serialize)]
pub struct OperationTypeResponse {
    pub id: Uuid,
    pub name: String,
    pub tokens_per_operation: i32,
    pub description: String,
}

impl From<OperationType> for OperationTypeResponse {
    fn from(op: OperationType) -> Self {
        Self {
            id: op.id,
            name: op.name.as_str().to_string(),
            tokens_per_operation: op.tokens_per_operation,
            description: op.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationsCatalogResponse {
    pub operations: Vec<OperationTypeResponse>,
}

#[derive(Debug, Serialize)]
pub struct OutputImage {
    pub image_id: Uuid,
    pub image_url: String,
    pub mime: String,
    pub size_bytes: i64,
}

impl From<Upload> for OutputImage {
    fn from(u: Upload) -> Self {
        Self {
            image_id: u.id,
            image_url: u.public_url,
            mime: u.mime_type,
            size_bytes: u.size_bytes,
        }
    }
}

/// `GenerationView` projection (spec SS4.I): the key set present depends
/// on `status`, so most fields are optional on the wire even though the
/// underlying row always has them.
#[derive(Debug, Serialize)]
pub struct GenerationView {
    pub generation_id: Uuid,
    pub status: GenerationStatus,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<OutputImage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationView {
    /// Projects a `Generation` row plus its resolved output uploads (empty
    /// unless `status=completed`) into the wire shape.
    pub fn from_generation(generation: Generation, outputs: Vec<Upload>) -> Self {
        let is_completed = matches!(generation.status, GenerationStatus::Completed);
        let is_failed = matches!(generation.status, GenerationStatus::Failed);

        Self {
            generation_id: generation.id,
            status: generation.status,
            progress: generation.progress,
            created_at: generation.created_at,
            metadata: generation.metadata.0,
            completed_at: generation.completed_at,
            images: is_completed.then(|| outputs.into_iter().map(OutputImage::from).collect()),
            tokens_used: (is_completed || is_failed).then_some(generation.tokens_used),
            processing_time_ms: is_completed.then_some(generation.processing_time_ms).flatten(),
            error: is_failed.then_some(generation.error_message).flatten(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub results: Vec<GenerationView>,
    pub cursor: TimelineCursor,
}

#[derive(Debug, Serialize)]
pub struct TimelineCursor {
    pub next: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub include_failed: bool,
}
