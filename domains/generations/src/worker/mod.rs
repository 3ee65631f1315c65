//! Worker Pool (spec SS4.F): the generation processor. Implements
//! `studio_queue::JobProcessor` following `domains/jobs`'s processor-over-
//! trait-object composition, driving the 10-step skeleton against the
//! repositories, ledger, object store, provider adapter and event fabric
//! it is constructed with.

pub mod temp_cache;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use studio_ledger::{LedgerRepository, ReasonCode, TokenLedger, TransactionKind};
use studio_provider::{GenerateConfig, GenerateRequest, ImagePart, ProviderAdapter};
use studio_queue::{JobProcessor, JobRecord};
use studio_realtime::{CompletedImage, Event, EventFabric, GenerationResult, TokensSummary};
use studio_storage::{ObjectStore, UploadPurpose as StorageUploadPurpose};
use uuid::Uuid;

use crate::domain::entities::GenerationStatus;
use crate::domain::{GenerationEvent, PromptComposer};
use crate::repository::{
    transactions as repo_tx, GenerationsRepository, OperationTypeRepository,
    PromptTemplateRepository, UploadRepository,
};
use crate::worker::temp_cache::{CachedImage, TempCache};

/// Job payload enqueued by the Intake Controller (spec SS4.G step 5).
/// Every other field the processor needs is read back off the
/// `Generation` row itself, so redelivery never depends on payload
/// freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJobPayload {
    pub generation_id: Uuid,
    pub user_id: Uuid,
}

pub struct GenerationProcessor {
    repo: GenerationsRepository,
    operation_types: OperationTypeRepository,
    prompt_templates: PromptTemplateRepository,
    uploads: UploadRepository,
    ledger: TokenLedger,
    ledger_repo: LedgerRepository,
    storage: Arc<dyn ObjectStore>,
    provider: Arc<ProviderAdapter>,
    fabric: Arc<dyn EventFabric>,
    temp_cache: TempCache,
}

impl GenerationProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: GenerationsRepository,
        operation_types: OperationTypeRepository,
        prompt_templates: PromptTemplateRepository,
        uploads: UploadRepository,
        ledger: TokenLedger,
        ledger_repo: LedgerRepository,
        storage: Arc<dyn ObjectStore>,
        provider: Arc<ProviderAdapter>,
        fabric: Arc<dyn EventFabric>,
    ) -> Self {
        Self {
            repo,
            operation_types,
            prompt_templates,
            uploads,
            ledger,
            ledger_repo,
            storage,
            provider,
            fabric,
            temp_cache: TempCache::new(),
        }
    }

    /// Step 1: idempotency probe + transition to `processing`. Returns
    /// `None` if the job should stop here (already past `pending`).
    async fn begin_processing(&self, generation_id: Uuid) -> Result<Option<()>, String> {
        let mut tx = self.repo.begin().await.map_err(|e| e.to_string())?;
        let current = repo_tx::lock_generation_row_tx(&mut tx, generation_id)
            .await
            .map_err(|e| e.to_string())?;

        let Some(current) = current else {
            tx.rollback().await.map_err(|e| e.to_string())?;
            return Err(format!("generation {} not found", generation_id));
        };

        match current.checked_transition(GenerationEvent::Dequeue) {
            Ok(GenerationStatus::Processing) => {
                repo_tx::update_status_tx(
                    &mut tx,
                    generation_id,
                    GenerationStatus::Processing,
                    10,
                    None,
                )
                .await
                .map_err(|e| e.to_string())?;
                tx.commit().await.map_err(|e| e.to_string())?;
                Ok(Some(()))
            }
            Ok(other) => {
                tx.rollback().await.map_err(|e| e.to_string())?;
                tracing::warn!(generation_id = %generation_id, ?other, "unexpected transition target, skipping");
                Ok(None)
            }
            Err(_) if current.status == GenerationStatus::Processing => {
                // Redelivery of a job that already made it past step 1:
                // resume without re-transitioning (spec SS4.F step 1,
                // SS5 "at-least-once redelivery absorbed by the idempotent
                // status check").
                tx.rollback().await.map_err(|e| e.to_string())?;
                Ok(Some(()))
            }
            Err(_) => {
                tx.rollback().await.map_err(|e| e.to_string())?;
                tracing::info!(generation_id = %generation_id, status = ?current.status, "redelivered job, already terminal: skipping");
                Ok(None)
            }
        }
    }

    async fn fail(&self, generation_id: Uuid, user_id: Uuid, reason: &str) -> Result<(), String> {
        let mut tx = self.repo.begin().await.map_err(|e| e.to_string())?;
        repo_tx::update_status_tx(&mut tx, generation_id, GenerationStatus::Failed, 0, Some(reason))
            .await
            .map_err(|e| e.to_string())?;
        tx.commit().await.map_err(|e| e.to_string())?;

        self.fabric.emit(
            user_id,
            Event::GenerationFailed {
                generation_id,
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    async fn load_reference_image(&self, upload_id: Uuid) -> Result<ImagePart, String> {
        if let Some(cached) = self.temp_cache.get(upload_id).await {
            return Ok(ImagePart {
                bytes: cached.bytes,
                mime: cached.mime,
            });
        }

        let upload = self
            .uploads
            .get_by_id(upload_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("upload {} not found", upload_id))?;

        let bytes = self
            .storage
            .fetch(&upload.public_url)
            .await
            .map_err(|e| e.to_string())?;

        self.temp_cache
            .put(
                upload_id,
                CachedImage {
                    bytes: bytes.clone(),
                    mime: upload.mime_type.clone(),
                },
            )
            .await;

        Ok(ImagePart {
            bytes,
            mime: upload.mime_type,
        })
    }
}

#[async_trait]
impl JobProcessor for GenerationProcessor {
    async fn process(&self, job: &JobRecord) -> Result<serde_json::Value, String> {
        let payload: GenerationJobPayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| e.to_string())?;
        let generation_id = payload.generation_id;
        let user_id = payload.user_id;

        if self.begin_processing(generation_id).await?.is_none() {
            return Ok(serde_json::json!({ "skipped": true }));
        }

        self.fabric.emit(
            user_id,
            Event::GenerationProgress {
                generation_id,
                percent: 10,
                stage: "processing".to_string(),
            },
        );

        let started = Instant::now();

        let generation = self
            .repo
            .get_by_id(generation_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("generation {} vanished mid-flight", generation_id))?;

        let operation_type = self
            .operation_types
            .get_by_id(generation.operation_type_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "operation type not found".to_string())?;

        let number_of_images = generation.number_of_images();
        let total_cost = operation_type.cost_for(number_of_images);

        // Step 3: pre-debit check.
        let balance = self.ledger.get_balance(user_id).await.map_err(|e| e.to_string())?;
        if balance.balance < total_cost {
            self.fail(generation_id, user_id, "insufficient_tokens").await?;
            return Ok(serde_json::json!({ "status": "failed", "reason": "insufficient_tokens" }));
        }

        // Step 4: resolve reference images (target first, then named
        // single reference, then the multi-reference list in submitted
        // order) from the temp cache or the Object Store Facade.
        let mut upload_ids_to_load = Vec::new();
        upload_ids_to_load.extend(generation.target_image_id);
        upload_ids_to_load.extend(generation.reference_image_id);
        if let Some(refs) = &generation.reference_image_ids {
            upload_ids_to_load.extend(refs.iter().copied());
        }

        let mut reference_images = Vec::with_capacity(upload_ids_to_load.len());
        for upload_id in &upload_ids_to_load {
            reference_images.push(self.load_reference_image(*upload_id).await?);
        }

        if !upload_ids_to_load.is_empty() {
            self.fabric.emit(
                user_id,
                Event::GenerationProgress {
                    generation_id,
                    percent: 30,
                    stage: "inputs_loaded".to_string(),
                },
            );
        }

        // Step 5: effective prompt.
        let template = match generation.prompt_template_id {
            Some(id) => self
                .prompt_templates
                .get_active_by_id(id)
                .await
                .map_err(|e| e.to_string())?,
            None => None,
        };
        let effective_prompt =
            PromptComposer::compose(template.as_ref(), &generation.prompt, generation.reference_type);

        // Step 6: generate + upload + progress, one image at a time.
        let mut image_ids = Vec::with_capacity(number_of_images as usize);
        let mut outputs = Vec::with_capacity(number_of_images as usize);
        for i in 1..=number_of_images {
            let request = GenerateRequest {
                prompt: effective_prompt.clone(),
                reference_images: reference_images.clone(),
                model: generation.model.clone(),
                config: GenerateConfig::default(),
            };

            let result = match self.provider.generate(user_id, request).await {
                Ok(result) => result,
                Err(err) => {
                    self.temp_cache.purge(&upload_ids_to_load).await;
                    self.fail(generation_id, user_id, &err.to_string()).await?;
                    return Ok(serde_json::json!({ "status": "failed", "reason": err.to_string() }));
                }
            };

            let put_outcome = match self
                .storage
                .put(
                    user_id,
                    StorageUploadPurpose::GenerationOutput,
                    result.image_bytes,
                    &result.mime,
                    &format!("{}_{}.png", generation_id, i),
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.temp_cache.purge(&upload_ids_to_load).await;
                    self.fail(generation_id, user_id, &err.to_string()).await?;
                    return Ok(serde_json::json!({ "status": "failed", "reason": err.to_string() }));
                }
            };

            let mut upload_tx = self.repo.begin().await.map_err(|e| e.to_string())?;
            let upload = repo_tx::insert_upload_tx(
                &mut upload_tx,
                user_id,
                crate::domain::entities::UploadPurpose::GenerationOutput,
                &result.mime,
                put_outcome.size_bytes,
                &put_outcome.storage_provider,
                &put_outcome.storage_bucket,
                &put_outcome.storage_key,
                &put_outcome.public_url,
                None,
            )
            .await
            .map_err(|e| e.to_string())?;
            upload_tx.commit().await.map_err(|e| e.to_string())?;

            image_ids.push(upload.id);
            outputs.push(upload);

            let percent = 40 + (40 * i / number_of_images) as u8;
            self.fabric.emit(
                user_id,
                Event::GenerationProgress {
                    generation_id,
                    percent,
                    stage: "generating".to_string(),
                },
            );
        }

        self.temp_cache.purge(&upload_ids_to_load).await;

        // Step 7: debit and attach outputs in one transaction.
        let processing_time_ms = started.elapsed().as_millis() as i64;
        let idempotency_key = generation_id.to_string();

        let mut tx = self.ledger_repo.begin().await.map_err(|e| e.to_string())?;
        let balance_row = studio_ledger::repository::transactions::lock_balance_row_tx(&mut tx, user_id)
            .await
            .map_err(|e| e.to_string())?;

        let existing = studio_ledger::repository::transactions::find_by_idempotency_key_tx(
            &mut tx,
            user_id,
            &idempotency_key,
        )
        .await
        .map_err(|e| e.to_string())?;

        let new_balance = if let Some(existing) = existing {
            existing.balance_after
        } else {
            if balance_row.balance < total_cost {
                tx.rollback().await.map_err(|e| e.to_string())?;
                self.fail(generation_id, user_id, "insufficient_tokens").await?;
                return Ok(serde_json::json!({ "status": "failed", "reason": "insufficient_tokens" }));
            }

            let new_balance = balance_row.balance - total_cost;
            let notes = serde_json::json!({ "idempotencyKey": idempotency_key });

            studio_ledger::repository::transactions::insert_transaction_tx(
                &mut tx,
                user_id,
                TransactionKind::Debit,
                total_cost,
                new_balance,
                ReasonCode::SpendGeneration,
                Some("generation"),
                Some(generation_id),
                notes,
                None,
            )
            .await
            .map_err(|e| e.to_string())?;

            studio_ledger::repository::transactions::update_balance_tx(
                &mut tx,
                user_id,
                new_balance,
                0,
                total_cost,
            )
            .await
            .map_err(|e| e.to_string())?;

            new_balance
        };

        repo_tx::attach_outputs_tx(&mut tx, generation_id, &image_ids, total_cost, processing_time_ms)
            .await
            .map_err(|e| e.to_string())?;

        tx.commit().await.map_err(|e| e.to_string())?;

        // Step 6 of the ledger algorithm and step 8 here: emit only after commit.
        let now = chrono::Utc::now();
        self.fabric.emit(
            user_id,
            Event::TokensBalanceUpdated {
                balance: new_balance,
                change: -total_cost,
                reason: ReasonCode::SpendGeneration.as_str().to_string(),
                timestamp: now,
            },
        );
        self.fabric.emit(
            user_id,
            Event::GenerationCompleted {
                generation_id,
                output_upload_ids: image_ids.clone(),
                result: GenerationResult {
                    images: outputs
                        .into_iter()
                        .map(|u| CompletedImage {
                            image_id: u.id,
                            image_url: u.public_url,
                            mime: u.mime_type,
                            size_bytes: u.size_bytes,
                        })
                        .collect(),
                    tokens: TokensSummary {
                        used: total_cost,
                        remaining: new_balance,
                    },
                    metadata: generation.metadata.0.clone(),
                },
                timestamp: now,
            },
        );

        tracing::info!(
            generation_id = %generation_id,
            user_id = %user_id,
            tokens_used = total_cost,
            images = image_ids.len(),
            "generation completed"
        );

        Ok(serde_json::json!({ "status": "completed", "imageIds": image_ids }))
    }

    /// Spec §5: once the queue gives up retrying a job, the generation it
    /// was driving must not be left stuck in `processing` forever.
    async fn on_exhausted(&self, job: &JobRecord) {
        let Ok(payload) = serde_json::from_value::<GenerationJobPayload>(job.payload.clone()) else {
            tracing::error!(job_id = %job.id, "exhausted job has unparseable payload, cannot fail generation");
            return;
        };

        if let Err(e) = self
            .fail(payload.generation_id, payload.user_id, "exceeded retry budget")
            .await
        {
            tracing::error!(
                generation_id = %payload.generation_id,
                error = %e,
                "failed to transition exhausted generation to failed"
            );
        }
    }
}
