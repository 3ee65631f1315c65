//! Job Queue (spec §4.E)
//!
//! Durable FIFO-with-priority queue keyed by job type, at-least-once
//! delivery. Follows the teacher's `InngestService` trait+factory+mock
//! shape for its *shape* (the inngest crate itself is a fire-and-forget
//! outbound event trigger, insufficient alone for a durable internal
//! queue — its semantics are not reused, only its composition pattern).

pub mod mock;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue configuration error: {0}")]
    Configuration(String),

    #[error("queue storage error: {0}")]
    Storage(String),

    #[error("job not found: {0}")]
    NotFound(Uuid),
}

/// Priority band (spec §4.E): `1=critical .. 5=verylow`, FIFO within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    VeryLow = 5,
}

impl Priority {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub priority: Priority,
    pub attempts: u32,
    /// Base backoff in ms; actual delay grows exponentially per attempt.
    pub backoff_ms: u64,
    pub delay_ms: u64,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            attempts: 3,
            backoff_ms: 2000,
            delay_ms: 0,
            remove_on_complete: false,
            remove_on_fail: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub queue_name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i16,
    pub state: JobState,
    pub progress: i32,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub return_value: Option<serde_json::Value>,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// What a worker does with one dequeued job: succeed with a return value,
/// or fail with a reason (the queue decides whether to retry or move to
/// `Failed` based on `attempts`).
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &JobRecord) -> Result<serde_json::Value, String>;

    /// Called once a job has exhausted `max_attempts` and the queue has
    /// given up retrying it (spec §5: "the corresponding generation is
    /// transitioned to `failed`"). `job.attempts_made`/`max_attempts`
    /// reflect the state at the moment retries were abandoned. Default
    /// no-op for processors that don't need to react (e.g. tests).
    async fn on_exhausted(&self, _job: &JobRecord) {}
}

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub concurrency: usize,
    /// Caps throughput to the provider: at most `max_per_duration` jobs
    /// started per `duration_ms` window, shared across this subscription's
    /// worker tasks.
    pub max_per_duration: Option<u32>,
    pub duration_ms: u64,
    /// How long an idle worker sleeps between empty-queue polls.
    pub poll_interval_ms: u64,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_per_duration: None,
            duration_ms: 1000,
            poll_interval_ms: 250,
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        queue_name: &str,
        job_type: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError>;

    /// Start `opts.concurrency` worker loops dequeuing from `queue_name`
    /// and driving `processor`. Returns once the loops are spawned — the
    /// caller holds them alive via the returned `JoinHandle`s it gets from
    /// its composition root's task set, not via this trait.
    async fn subscribe(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        opts: SubscribeOptions,
    ) -> Result<(), QueueError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError>;
    async fn list_failed(&self, queue_name: &str) -> Result<Vec<JobRecord>, QueueError>;
    async fn retry(&self, queue_name: &str, job_id: Uuid) -> Result<(), QueueError>;
    async fn clean(&self, queue_name: &str) -> Result<u64, QueueError>;
    async fn metrics(&self, queue_name: &str) -> Result<QueueMetrics, QueueError>;
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub provider: String,
    /// Reuses `database_url` since the durable queue is Postgres-backed
    /// (spec §6's configuration table: "queue backing store address").
    pub database_url: String,
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, QueueError> {
        let provider = std::env::var("QUEUE_PROVIDER").unwrap_or_else(|_| "postgres".to_string());
        let database_url = std::env::var("DATABASE_URL").unwrap_or_default();
        if provider == "postgres" && database_url.is_empty() {
            return Err(QueueError::Configuration(
                "DATABASE_URL is required for the postgres queue provider".to_string(),
            ));
        }
        Ok(Self {
            provider,
            database_url,
        })
    }
}

pub struct QueueServiceFactory;

impl QueueServiceFactory {
    pub async fn create(
        config: QueueConfig,
        pool: Option<sqlx::PgPool>,
    ) -> Result<Arc<dyn JobQueue>, QueueError> {
        match config.provider.as_str() {
            "postgres" => {
                let pool = pool.ok_or_else(|| {
                    QueueError::Configuration("postgres queue requires a PgPool".to_string())
                })?;
                tracing::info!("creating postgres-backed job queue");
                Ok(Arc::new(postgres::PgJobQueue::new(pool)))
            }
            "mock" => {
                tracing::info!("creating in-memory mock job queue");
                Ok(Arc::new(mock::MockJobQueue::new()))
            }
            provider => Err(QueueError::Configuration(format!(
                "unknown queue provider: {}. supported providers: postgres, mock",
                provider
            ))),
        }
    }
}
