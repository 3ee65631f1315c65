//! Generative Provider Adapter (spec §4.B)
//!
//! Rate-limited, retry-aware client in front of the third-party image
//! model. Follows the teacher's `LlmService`/`RenderService` trait +
//! factory + mock shape; the retry loop and per-user sliding-window rate
//! limiter have no teacher counterpart (those adapters fire once) and are
//! built fresh per SPEC_FULL §4.B.

pub mod gemini;
pub mod mock;
pub mod rate_limiter;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use rate_limiter::RateLimiter;
use retry::{backoff_for_attempt, classify_provider_error, ErrorClass, MAX_ATTEMPTS};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider rate limited")]
    RateLimited,

    #[error("no image in provider response")]
    NoImageInResponse,

    #[error("provider transient error: {0}")]
    Transient(String),

    #[error("provider permanent error: {0}")]
    Permanent(String),

    #[error("provider configuration error: {0}")]
    Configuration(String),
}

/// One reference/target image passed to the model, already decoded to raw
/// bytes (base64 marshalling happens at the HTTP boundary, see
/// `gemini::encode_inline_part`).
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub aspect_ratio: Option<String>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            aspect_ratio: None,
        }
    }
}

/// A single provider call. `reference_images` holds 0..=6 images: empty for
/// text-to-image, one for `image_reference`, or the target followed by up
/// to five references (submitted order) for `image_multiple_reference`.
/// The adapter marshals text first, then images in this order (spec §4.B).
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub reference_images: Vec<ImagePart>,
    pub model: String,
    pub config: GenerateConfig,
}

#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub image_bytes: Vec<u8>,
    pub mime: String,
}

/// Raw, single-attempt call to the model backend. Implementations never
/// retry or rate-limit themselves — that's the adapter's job.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn call(&self, request: &GenerateRequest) -> Result<GenerateResult, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            provider: std::env::var("PROVIDER").unwrap_or_else(|_| "mock".to_string()),
            api_key: std::env::var("PROVIDER_API_KEY").unwrap_or_default(),
            base_url: std::env::var("PROVIDER_BASE_URL").ok(),
            default_model: std::env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-image".to_string()),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            rate_limit_max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        }
    }
}

/// The adapter: wraps a raw `GenerativeClient` with the per-user sliding
/// window rate limiter and the retry/backoff policy spec §4.B mandates.
pub struct ProviderAdapter {
    client: Box<dyn GenerativeClient>,
    rate_limiter: RateLimiter,
}

impl ProviderAdapter {
    pub fn new(client: Box<dyn GenerativeClient>, config: &ProviderConfig) -> Self {
        Self {
            client,
            rate_limiter: RateLimiter::new(
                Duration::from_secs(config.rate_limit_window_secs),
                config.rate_limit_max_requests,
            ),
        }
    }

    /// `Generate(op) -> {imageData, mime}` per spec §4.B, scoped to the
    /// requesting user's rate-limit window.
    pub async fn generate(
        &self,
        user_id: Uuid,
        request: GenerateRequest,
    ) -> Result<GenerateResult, ProviderError> {
        if !self.rate_limiter.try_admit(user_id) {
            return Err(ProviderError::RateLimited);
        }

        let mut attempt = 1;
        loop {
            match self.client.call(&request).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let class = match &err {
                        ProviderError::Transient(_) => ErrorClass::Transient,
                        ProviderError::Permanent(_)
                        | ProviderError::NoImageInResponse
                        | ProviderError::Configuration(_) => ErrorClass::Permanent,
                        ProviderError::RateLimited => ErrorClass::Permanent,
                    };

                    if class != ErrorClass::Transient || attempt >= MAX_ATTEMPTS {
                        tracing::warn!(
                            user_id = %user_id,
                            attempt,
                            error = %err,
                            "provider call failed, giving up"
                        );
                        return Err(err);
                    }

                    let delay = backoff_for_attempt(attempt);
                    tracing::info!(
                        user_id = %user_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "provider call failed transiently, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Classify a raw error message from an HTTP client response body into a
/// `ProviderError`, matching substrings per spec §4.B.
pub fn error_from_message(message: impl Into<String>) -> ProviderError {
    let message = message.into();
    match classify_provider_error(&message) {
        ErrorClass::Transient => ProviderError::Transient(message),
        ErrorClass::Permanent | ErrorClass::Unknown => ProviderError::Permanent(message),
    }
}

pub struct ProviderServiceFactory;

impl ProviderServiceFactory {
    pub fn create(config: ProviderConfig) -> Result<Arc<ProviderAdapter>, ProviderError> {
        let client: Box<dyn GenerativeClient> = match config.provider.as_str() {
            "gemini" => {
                tracing::info!("creating Gemini generative client");
                Box::new(gemini::GeminiClient::new(config.clone()))
            }
            "mock" => {
                tracing::info!("creating mock generative client");
                Box::new(mock::MockGenerativeClient::new())
            }
            provider => {
                return Err(ProviderError::Configuration(format!(
                    "unknown provider: {}. supported providers: gemini, mock",
                    provider
                )))
            }
        };

        Ok(Arc::new(ProviderAdapter::new(client, &config)))
    }
}
