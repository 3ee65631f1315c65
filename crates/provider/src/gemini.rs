//! Gemini generative image client.
//!
//! Calls the `generateContent` endpoint with one content block whose parts
//! are `{text: prompt}` followed by inline image parts in submitted order
//! (spec §4.B). Grounded on `crates/llm/src/anthropic.rs`'s request/response
//! struct shape and status-code branching.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{error_from_message, GenerateRequest, GenerateResult, GenerativeClient, ProviderConfig, ProviderError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { #[serde(rename = "inlineData")] inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "aspectRatio", skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Marshal prompt + images into the content block's parts: text first,
/// then images in submitted order (spec §4.B).
fn build_parts(request: &GenerateRequest) -> Vec<Part> {
    let mut parts = vec![Part::Text {
        text: request.prompt.clone(),
    }];
    for image in &request.reference_images {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime.clone(),
                data: STANDARD.encode(&image.bytes),
            },
        });
    }
    parts
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key,
            base_url: config.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl GenerativeClient for GeminiClient {
    async fn call(&self, request: &GenerateRequest) -> Result<GenerateResult, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: build_parts(request),
            }],
            generation_config: GenerationConfig {
                temperature: request.config.temperature,
                top_k: request.config.top_k,
                top_p: request.config.top_p,
                aspect_ratio: request.config.aspect_ratio.clone(),
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, request.model, self.api_key
        );

        tracing::debug!(model = %request.model, "sending generative provider request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| error_from_message(format!("network error: {}", e)))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Transient("rate limit exceeded".to_string()));
        }

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());

            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&error_body) {
                return Err(error_from_message(envelope.error.message));
            }
            return Err(error_from_message(format!("provider returned {}: {}", status, error_body)));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("failed to parse response: {}", e)))?;

        let inline = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.inline_data))
            .ok_or(ProviderError::NoImageInResponse)?;

        let image_bytes = STANDARD
            .decode(inline.data)
            .map_err(|e| ProviderError::Permanent(format!("invalid base64 image data: {}", e)))?;

        Ok(GenerateResult {
            image_bytes,
            mime: inline.mime_type,
        })
    }
}
