//! In-memory job queue: unit tests, local dev without Postgres, and the
//! `QueueServiceFactory` dispatch target for `provider == "mock"`. Mirrors
//! `MockRenderService`'s `Arc<Mutex<...>>` shared-state idiom.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    EnqueueOptions, JobProcessor, JobQueue, JobRecord, JobState, QueueError, QueueMetrics,
    SubscribeOptions,
};

struct Inner {
    jobs: HashMap<Uuid, JobRecord>,
}

pub struct MockJobQueue {
    inner: Arc<Mutex<Inner>>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                jobs: HashMap::new(),
            })),
        }
    }

    fn next_waiting(&self, queue_name: &str) -> Option<JobRecord> {
        let mut guard = self.inner.lock().unwrap();
        let mut candidates: Vec<&mut JobRecord> = guard
            .jobs
            .values_mut()
            .filter(|j| j.queue_name == queue_name && j.state == JobState::Waiting)
            .collect();
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        let picked = candidates.into_iter().next()?;
        picked.state = JobState::Active;
        picked.updated_at = Utc::now();
        Some(picked.clone())
    }
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(
        &self,
        queue_name: &str,
        job_type: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = JobRecord {
            id,
            queue_name: queue_name.to_string(),
            job_type: job_type.to_string(),
            payload,
            priority: opts.priority.as_i16(),
            state: JobState::Waiting,
            progress: 0,
            attempts_made: 0,
            max_attempts: opts.attempts,
            return_value: None,
            failed_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().jobs.insert(id, record);
        tracing::debug!(job_id = %id, queue_name, job_type, "enqueued mock job");
        Ok(id)
    }

    async fn subscribe(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        opts: SubscribeOptions,
    ) -> Result<(), QueueError> {
        for _ in 0..opts.concurrency {
            let inner = self.inner.clone();
            let queue_name = queue_name.to_string();
            let processor = processor.clone();
            let poll_interval = Duration::from_millis(opts.poll_interval_ms);
            let queue = MockJobQueue { inner };

            tokio::spawn(async move {
                loop {
                    match queue.next_waiting(&queue_name) {
                        Some(job) => {
                            let attempts_made = job.attempts_made + 1;
                            let max_attempts = job.max_attempts;
                            match processor.process(&job).await {
                                Ok(value) => {
                                    let mut guard = queue.inner.lock().unwrap();
                                    if let Some(record) = guard.jobs.get_mut(&job.id) {
                                        record.state = JobState::Completed;
                                        record.progress = 100;
                                        record.return_value = Some(value);
                                        record.updated_at = Utc::now();
                                    }
                                }
                                Err(reason) => {
                                    let exhausted = {
                                        let mut guard = queue.inner.lock().unwrap();
                                        match guard.jobs.get_mut(&job.id) {
                                            Some(record) => {
                                                record.attempts_made = attempts_made;
                                                record.failed_reason = Some(reason);
                                                record.updated_at = Utc::now();
                                                record.state = if attempts_made < max_attempts {
                                                    JobState::Waiting
                                                } else {
                                                    JobState::Failed
                                                };
                                                (record.state == JobState::Failed).then(|| record.clone())
                                            }
                                            None => None,
                                        }
                                    };
                                    if let Some(exhausted) = exhausted {
                                        processor.on_exhausted(&exhausted).await;
                                    }
                                }
                            }
                        }
                        None => tokio::time::sleep(poll_interval).await,
                    }
                }
            });
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.inner.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn list_failed(&self, queue_name: &str) -> Result<Vec<JobRecord>, QueueError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.queue_name == queue_name && j.state == JobState::Failed)
            .cloned()
            .collect())
    }

    async fn retry(&self, queue_name: &str, job_id: Uuid) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().unwrap();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .filter(|j| j.queue_name == queue_name && j.state == JobState::Failed)
            .ok_or(QueueError::NotFound(job_id))?;
        job.state = JobState::Waiting;
        job.failed_reason = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn clean(&self, queue_name: &str) -> Result<u64, QueueError> {
        let mut guard = self.inner.lock().unwrap();
        let before = guard.jobs.len();
        guard.jobs.retain(|_, j| {
            !(j.queue_name == queue_name
                && matches!(j.state, JobState::Completed | JobState::Failed))
        });
        Ok((before - guard.jobs.len()) as u64)
    }

    async fn metrics(&self, queue_name: &str) -> Result<QueueMetrics, QueueError> {
        let guard = self.inner.lock().unwrap();
        let mut metrics = QueueMetrics::default();
        for job in guard.jobs.values().filter(|j| j.queue_name == queue_name) {
            match job.state {
                JobState::Waiting => metrics.waiting += 1,
                JobState::Active => metrics.active += 1,
                JobState::Completed => metrics.completed += 1,
                JobState::Failed => metrics.failed += 1,
            }
        }
        Ok(metrics)
    }
}
