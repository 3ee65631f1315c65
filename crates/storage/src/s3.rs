//! S3-backed `ObjectStore` implementation.
//!
//! Grounded on the `aws-sdk-s3`/`aws-config` dependency pair the teacher
//! declares (unused) in `crates/comfyui/Cargo.toml` — the closest thing to
//! an S3 client convention in the example pack.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;

use crate::key::build_key;
use crate::{ObjectStore, PutOutcome, StorageConfig, StorageError, UploadPurpose};

pub struct S3ObjectStore {
    bucket: String,
    public_base_url: String,
    allowed_download_hosts: Vec<String>,
    client: tokio::sync::OnceCell<aws_sdk_s3::Client>,
}

impl S3ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            bucket: config.bucket,
            public_base_url: config.public_base_url,
            allowed_download_hosts: config.allowed_download_hosts,
            client: tokio::sync::OnceCell::new(),
        }
    }

    async fn client(&self) -> &aws_sdk_s3::Client {
        self.client
            .get_or_init(|| async {
                let shared_config = aws_config::load_from_env().await;
                aws_sdk_s3::Client::new(&shared_config)
            })
            .await
    }

    fn is_allowed_host(&self, url: &str) -> bool {
        self.allowed_download_hosts
            .iter()
            .any(|host| url.contains(host))
            || url.starts_with(&self.public_base_url)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        user_id: uuid::Uuid,
        purpose: UploadPurpose,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<PutOutcome, StorageError> {
        let storage_key = build_key(user_id, Utc::now(), filename);
        let size_bytes = bytes.len() as i64;

        let client = self.client().await;
        client
            .put_object()
            .bucket(&self.bucket)
            .key(&storage_key)
            .content_type(mime)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, purpose = %purpose.as_str(), "s3 put_object failed");
                StorageError::Transient(format!("s3 put_object failed: {}", e))
            })?;

        let public_url = format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            storage_key
        );

        Ok(PutOutcome {
            storage_provider: "s3".to_string(),
            storage_bucket: self.bucket.clone(),
            storage_key,
            public_url,
            size_bytes,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        if !self.is_allowed_host(url) {
            return Err(StorageError::Permanent(format!(
                "host not allowed for fetch: {}",
                url
            )));
        }

        let key = url
            .strip_prefix(&format!("{}/", self.public_base_url.trim_end_matches('/')))
            .ok_or_else(|| StorageError::Permanent("url not in our namespace".to_string()))?;

        let client = self.client().await;
        let output = client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Transient(format!("s3 get_object failed: {}", e)))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transient(format!("s3 stream read failed: {}", e)))?;

        Ok(data.into_bytes().to_vec())
    }
}
