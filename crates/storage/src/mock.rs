//! In-memory mock object store for tests and local development.
//!
//! Follows the teacher's `MockRenderService` shape: an `Arc`-shared history
//! of recorded puts plus a real byte store so `fetch` round-trips.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::key::build_key;
use crate::{ObjectStore, PutOutcome, StorageConfig, StorageError, UploadPurpose};

#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub user_id: uuid::Uuid,
    pub purpose: &'static str,
    pub storage_key: String,
    pub mime: String,
    pub size_bytes: i64,
}

#[derive(Clone)]
pub struct MockObjectStore {
    bucket: String,
    public_base_url: String,
    allowed_download_hosts: Vec<String>,
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    history: Arc<RwLock<Vec<RecordedPut>>>,
}

impl MockObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            bucket: config.bucket,
            public_base_url: config.public_base_url,
            allowed_download_hosts: config.allowed_download_hosts,
            blobs: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn recorded_puts(&self) -> Vec<RecordedPut> {
        self.history.read().unwrap().clone()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.read().unwrap().len()
    }

    fn is_allowed_host(&self, url: &str) -> bool {
        if self.allowed_download_hosts.is_empty() {
            // allow our own public base url even if the operator never configured
            // an explicit allow-list (single-tenant default).
            return url.starts_with(&self.public_base_url);
        }
        self.allowed_download_hosts
            .iter()
            .any(|host| url.contains(host))
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
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
        let public_url = format!("{}/{}", self.public_base_url.trim_end_matches('/'), storage_key);

        self.blobs
            .write()
            .unwrap()
            .insert(storage_key.clone(), bytes);
        self.history.write().unwrap().push(RecordedPut {
            user_id,
            purpose: purpose.as_str(),
            storage_key: storage_key.clone(),
            mime: mime.to_string(),
            size_bytes,
        });

        tracing::debug!(user_id = %user_id, key = %storage_key, "mock object store: put");

        Ok(PutOutcome {
            storage_provider: "mock".to_string(),
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

        self.blobs
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Transient(format!("blob not found: {}", key)))
    }
}
