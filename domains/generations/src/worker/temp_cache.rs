//! Short-lived local temp cache (spec SS4.F step 4, SS5): per-worker,
//! 5-minute TTL, keyed by `uploadId`, always purged in a finally-style
//! guaranteed-release scope once a job completes or fails.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

const TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CachedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

struct Entry {
    image: CachedImage,
    inserted_at: Instant,
}

/// In-memory cache the worker consults before falling back to the Object
/// Store Facade for a previously-uploaded reference image. Not shared
/// across processes; each worker keeps its own.
pub struct TempCache {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl Default for TempCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TempCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn put(&self, upload_id: Uuid, image: CachedImage) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            upload_id,
            Entry {
                image,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns `None` both when the key is absent and when its TTL has
    /// elapsed; an expired entry is evicted on read.
    pub async fn get(&self, upload_id: Uuid) -> Option<CachedImage> {
        let mut entries = self.entries.lock().await;
        match entries.get(&upload_id) {
            Some(entry) if entry.inserted_at.elapsed() < TTL => Some(entry.image.clone()),
            Some(_) => {
                entries.remove(&upload_id);
                None
            }
            None => None,
        }
    }

    /// Guaranteed-release purge for a finished job's temp files (spec
    /// SS4.F step 10).
    pub async fn purge(&self, upload_ids: &[Uuid]) {
        let mut entries = self.entries.lock().await;
        for id in upload_ids {
            entries.remove(id);
        }
    }
}
