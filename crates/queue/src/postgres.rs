//! Durable Postgres-backed job queue.
//!
//! Dequeue uses `SELECT ... FOR UPDATE SKIP LOCKED` ordered by
//! `(priority, created_at)` — the standard Postgres queue idiom, extending
//! the row-locking technique the teacher already uses for contended rows
//! (`domains/teams/src/repository/transactions.rs`'s `FOR UPDATE` reads)
//! with `SKIP LOCKED` so concurrent workers never block on each other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    EnqueueOptions, JobProcessor, JobQueue, JobRecord, JobState, QueueError, QueueMetrics,
    SubscribeOptions,
};

pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn dequeue_one(&self, queue_name: &str) -> Result<Option<JobRecord>, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT id, queue_name, job_type, payload, priority, state, progress,
                   attempts_made, max_attempts, backoff_ms, return_value, failed_reason,
                   created_at, updated_at
            FROM queue_jobs
            WHERE queue_name = $1
              AND state = 'waiting'
              AND run_at <= NOW()
            ORDER BY priority ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(queue_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        let Some(row) = row else {
            tx.commit().await.ok();
            return Ok(None);
        };

        let id: Uuid = row.try_get("id").map_err(|e| QueueError::Storage(e.to_string()))?;

        sqlx::query("UPDATE queue_jobs SET state = 'active', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(Some(row_to_record(&row)))
    }

    async fn mark_completed(&self, id: Uuid, return_value: serde_json::Value, remove: bool) -> Result<(), QueueError> {
        if remove {
            sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            return Ok(());
        }

        sqlx::query(
            "UPDATE queue_jobs SET state = 'completed', progress = 100, return_value = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(sqlx::types::Json(return_value))
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed_or_retry(
        &self,
        id: Uuid,
        attempts_made: u32,
        max_attempts: u32,
        backoff_ms: u64,
        reason: &str,
        remove_on_fail: bool,
    ) -> Result<(), QueueError> {
        if attempts_made < max_attempts {
            let delay_ms = backoff_ms.saturating_mul(1u64 << (attempts_made.saturating_sub(1)));
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET state = 'waiting', attempts_made = $2, failed_reason = $3,
                    run_at = NOW() + ($4 || ' milliseconds')::interval, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(attempts_made as i32)
            .bind(reason)
            .bind(delay_ms as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;
            return Ok(());
        }

        if remove_on_fail {
            sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            return Ok(());
        }

        sqlx::query(
            "UPDATE queue_jobs SET state = 'failed', attempts_made = $2, failed_reason = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(attempts_made as i32)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> JobRecord {
    let state_str: String = row.try_get("state").unwrap_or_else(|_| "waiting".to_string());
    let state = match state_str.as_str() {
        "active" => JobState::Active,
        "completed" => JobState::Completed,
        "failed" => JobState::Failed,
        _ => JobState::Waiting,
    };

    JobRecord {
        id: row.try_get("id").unwrap_or_default(),
        queue_name: row.try_get("queue_name").unwrap_or_default(),
        job_type: row.try_get("job_type").unwrap_or_default(),
        payload: row
            .try_get::<sqlx::types::Json<serde_json::Value>, _>("payload")
            .map(|j| j.0)
            .unwrap_or(serde_json::Value::Null),
        priority: row.try_get("priority").unwrap_or(3),
        state,
        progress: row.try_get("progress").unwrap_or(0),
        attempts_made: row.try_get::<i32, _>("attempts_made").unwrap_or(0) as u32,
        max_attempts: row.try_get::<i32, _>("max_attempts").unwrap_or(3) as u32,
        return_value: row
            .try_get::<Option<sqlx::types::Json<serde_json::Value>>, _>("return_value")
            .unwrap_or(None)
            .map(|j| j.0),
        failed_reason: row.try_get("failed_reason").unwrap_or(None),
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .unwrap_or_else(|_| Utc::now()),
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .unwrap_or_else(|_| Utc::now()),
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        queue_name: &str,
        job_type: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO queue_jobs
                (id, queue_name, job_type, payload, priority, state, progress,
                 attempts_made, max_attempts, backoff_ms, remove_on_complete, remove_on_fail,
                 run_at, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, 'waiting', 0,
                 0, $6, $7, $8, $9,
                 NOW() + ($10 || ' milliseconds')::interval, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(queue_name)
        .bind(job_type)
        .bind(sqlx::types::Json(payload))
        .bind(opts.priority.as_i16())
        .bind(opts.attempts as i32)
        .bind(opts.backoff_ms as i64)
        .bind(opts.remove_on_complete)
        .bind(opts.remove_on_fail)
        .bind(opts.delay_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        tracing::info!(job_id = %id, queue_name, job_type, "enqueued job");
        Ok(id)
    }

    async fn subscribe(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        opts: SubscribeOptions,
    ) -> Result<(), QueueError> {
        for worker_index in 0..opts.concurrency {
            let pool = self.pool.clone();
            let queue_name = queue_name.to_string();
            let processor = processor.clone();
            let poll_interval = Duration::from_millis(opts.poll_interval_ms);

            tokio::spawn(async move {
                let queue = PgJobQueue::new(pool);
                tracing::info!(worker_index, queue_name = %queue_name, "worker loop started");
                loop {
                    match queue.dequeue_one(&queue_name).await {
                        Ok(Some(job)) => {
                            let attempts_made = job.attempts_made + 1;
                            let max_attempts = job.max_attempts;
                            let backoff_ms = 2000u64; // base; actual delay grows per retry
                            let remove_on_fail = false;
                            let remove_on_complete = false;

                            match processor.process(&job).await {
                                Ok(value) => {
                                    if let Err(e) = queue
                                        .mark_completed(job.id, value, remove_on_complete)
                                        .await
                                    {
                                        tracing::error!(job_id = %job.id, error = %e, "failed to mark job completed");
                                    }
                                }
                                Err(reason) => {
                                    if let Err(e) = queue
                                        .mark_failed_or_retry(
                                            job.id,
                                            attempts_made,
                                            max_attempts,
                                            backoff_ms,
                                            &reason,
                                            remove_on_fail,
                                        )
                                        .await
                                    {
                                        tracing::error!(job_id = %job.id, error = %e, "failed to mark job failed");
                                    }
                                    if attempts_made >= max_attempts {
                                        let mut exhausted = job.clone();
                                        exhausted.attempts_made = attempts_made;
                                        processor.on_exhausted(&exhausted).await;
                                    }
                                }
                            }
                        }
                        Ok(None) => {
                            tokio::time::sleep(poll_interval).await;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "dequeue failed, backing off");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }
            });
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        let row = sqlx::query(
            r#"
            SELECT id, queue_name, job_type, payload, priority, state, progress,
                   attempts_made, max_attempts, backoff_ms, return_value, failed_reason,
                   created_at, updated_at
            FROM queue_jobs WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn list_failed(&self, queue_name: &str) -> Result<Vec<JobRecord>, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue_name, job_type, payload, priority, state, progress,
                   attempts_made, max_attempts, backoff_ms, return_value, failed_reason,
                   created_at, updated_at
            FROM queue_jobs
            WHERE queue_name = $1 AND state = 'failed'
            ORDER BY updated_at DESC
            "#,
        )
        .bind(queue_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn retry(&self, queue_name: &str, job_id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE queue_jobs SET state = 'waiting', failed_reason = NULL, run_at = NOW(), updated_at = NOW() WHERE id = $1 AND queue_name = $2 AND state = 'failed'",
        )
        .bind(job_id)
        .bind(queue_name)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id));
        }
        Ok(())
    }

    async fn clean(&self, queue_name: &str) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "DELETE FROM queue_jobs WHERE queue_name = $1 AND state IN ('completed', 'failed')",
        )
        .bind(queue_name)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn metrics(&self, queue_name: &str) -> Result<QueueMetrics, QueueError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'waiting') AS waiting,
                COUNT(*) FILTER (WHERE state = 'active') AS active,
                COUNT(*) FILTER (WHERE state = 'completed') AS completed,
                COUNT(*) FILTER (WHERE state = 'failed') AS failed
            FROM queue_jobs WHERE queue_name = $1
            "#,
        )
        .bind(queue_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(QueueMetrics {
            waiting: row.try_get("waiting").unwrap_or(0),
            active: row.try_get("active").unwrap_or(0),
            completed: row.try_get("completed").unwrap_or(0),
            failed: row.try_get("failed").unwrap_or(0),
        })
    }
}
