//! Object Store Facade
//!
//! Puts and fetches image blobs for the studio workspace. The facade does
//! not itself own the `uploads` table — callers persist the `Upload` row
//! (in whatever transaction they're already holding) using the
//! [`PutOutcome`] this crate returns. This mirrors the teacher's posture of
//! keeping its adapter crates (`RenderService`, `LlmService`) DB-free and
//! letting the owning domain do its own persistence.

pub mod key;
pub mod mock;
pub mod s3;

use async_trait::async_trait;
use thiserror::Error;

/// Failure surfaced by the facade. `Transient` is retryable by the caller
/// (network blip, throttling); `Permanent` is not (bad input, disallowed
/// host) per spec §4.A.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("permanent storage error: {0}")]
    Permanent(String),

    #[error("storage configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// What a generation's stored blob is for. Mirrors `UploadPurpose` on the
/// `Upload` entity (§3) — the facade doesn't interpret it, it only folds it
/// into the storage key layout's first segment grouping for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPurpose {
    Init,
    Mask,
    Reference,
    Attachment,
    GenerationOutput,
}

impl UploadPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPurpose::Init => "init",
            UploadPurpose::Mask => "mask",
            UploadPurpose::Reference => "reference",
            UploadPurpose::Attachment => "attachment",
            UploadPurpose::GenerationOutput => "generation_output",
        }
    }
}

/// Result of a successful `put`. The caller combines this with the rest of
/// the `Upload` entity's fields (`id`, `user_id`, `purpose`, ...) and
/// inserts it itself.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub storage_provider: String,
    pub storage_bucket: String,
    pub storage_key: String,
    pub public_url: String,
    pub size_bytes: i64,
}

/// Facade configuration, loaded as part of `studio_common::Config`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: String,
    pub bucket: String,
    pub public_base_url: String,
    /// Hosts `fetch` is permitted to dereference (spec §4.A `not_allowed`).
    pub allowed_download_hosts: Vec<String>,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let provider = std::env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "studio-mock-bucket".to_string());
        let public_base_url = std::env::var("S3_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("https://{}.s3.amazonaws.com", bucket));
        let allowed_download_hosts = std::env::var("ALLOWED_DOWNLOAD_HOSTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            provider,
            bucket,
            public_base_url,
            allowed_download_hosts,
        }
    }
}

/// Object store facade trait. `put` assigns the bit-exact key layout from
/// spec §6 and writes the blob; `fetch` dereferences a previously-issued
/// public URL, refusing any host not in the allow-list.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        user_id: uuid::Uuid,
        purpose: UploadPurpose,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<PutOutcome, StorageError>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

/// Factory for creating `ObjectStore` implementations, following the
/// teacher's `RenderServiceFactory`/`InngestServiceFactory` shape.
pub struct StorageServiceFactory;

impl StorageServiceFactory {
    pub fn create(config: StorageConfig) -> Result<Box<dyn ObjectStore>, StorageError> {
        match config.provider.as_str() {
            "s3" => {
                tracing::info!(bucket = %config.bucket, "creating S3 object store");
                Ok(Box::new(s3::S3ObjectStore::new(config)))
            }
            "mock" => {
                tracing::info!("creating mock object store");
                Ok(Box::new(mock::MockObjectStore::new(config)))
            }
            provider => Err(StorageError::Configuration(format!(
                "unknown storage provider: {}. supported providers: s3, mock",
                provider
            ))),
        }
    }
}
