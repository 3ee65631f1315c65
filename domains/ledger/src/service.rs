//! Token Ledger service (spec §4.C): the public `credit`/`debit`/
//! `get_balance`/`list_transactions`/`grant_signup_bonus` contract and the
//! shared 6-step mutating algorithm both `credit` and `debit` run.

use std::sync::Arc;

use studio_common::cursor::Cursor;
use studio_common::{Error, Result};
use studio_realtime::{Event, EventFabric};
use uuid::Uuid;

use crate::domain::entities::{
    LedgerMutationOptions, ReasonCode, TokenTransaction, TransactionKind, UserTokenBalance,
};
use crate::repository::{transactions as repo_tx, LedgerRepository, TransactionListFilter};

#[derive(Clone)]
pub struct TokenLedger {
    repo: LedgerRepository,
    fabric: Arc<dyn EventFabric>,
}

/// Outcome of a `credit`/`debit` call.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub balance: i64,
    pub tx_id: Uuid,
}

impl TokenLedger {
    pub fn new(repo: LedgerRepository, fabric: Arc<dyn EventFabric>) -> Self {
        Self { repo, fabric }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<UserTokenBalance> {
        Ok(self.repo.get_balance(user_id).await?)
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionListFilter,
        limit: i64,
        cursor: Option<Cursor>,
    ) -> Result<(Vec<TokenTransaction>, Option<Cursor>)> {
        let limit = limit.clamp(1, 100);
        let rows = self
            .repo
            .list_transactions(user_id, filter, limit, cursor)
            .await?;

        let next_cursor = rows
            .last()
            .filter(|_| rows.len() as i64 == limit)
            .map(|last| Cursor::new(last.created_at, last.id));

        Ok((rows, next_cursor))
    }

    /// Spec §4.C step-by-step algorithm, steps 2-5 (lock, probe, compute,
    /// write). Step 1 (begin) and step 6 (emit after commit) live in the
    /// caller (`credit`/`debit`) so the event only fires once the
    /// transaction is durably committed.
    async fn apply_mutation(
        &self,
        user_id: Uuid,
        kind: TransactionKind,
        amount: i64,
        reason_code: ReasonCode,
        opts: LedgerMutationOptions,
    ) -> Result<MutationOutcome> {
        if amount <= 0 {
            return Err(Error::Validation(
                "ledger amount must be positive".to_string(),
            ));
        }

        let mut tx = self.repo.begin().await?;

        let balance = repo_tx::lock_balance_row_tx(&mut tx, user_id).await?;

        if let Some(ref key) = opts.idempotency_key {
            if let Some(existing) = repo_tx::find_by_idempotency_key_tx(&mut tx, user_id, key).await? {
                tx.commit().await?;
                return Ok(MutationOutcome {
                    balance: existing.balance_after,
                    tx_id: existing.id,
                });
            }
        }

        let (new_balance, earned_delta, spent_delta) = match kind {
            TransactionKind::Credit => (balance.balance + amount, amount, 0),
            TransactionKind::Debit => {
                if balance.balance < amount {
                    return Err(Error::InsufficientBalance(format!(
                        "balance {} is less than requested debit {}",
                        balance.balance, amount
                    )));
                }
                (balance.balance - amount, 0, amount)
            }
        };

        let notes = opts.notes.unwrap_or_else(|| serde_json::json!({}));
        let notes = match opts.idempotency_key {
            Some(key) => {
                let mut notes = notes;
                notes["idempotencyKey"] = serde_json::Value::String(key);
                notes
            }
            None => notes,
        };

        let created = repo_tx::insert_transaction_tx(
            &mut tx,
            user_id,
            kind,
            amount,
            new_balance,
            reason_code,
            opts.reference_type.as_deref(),
            opts.reference_id,
            notes,
            opts.admin_id,
        )
        .await?;

        repo_tx::update_balance_tx(&mut tx, user_id, new_balance, earned_delta, spent_delta).await?;

        tx.commit().await?;

        let change = match kind {
            TransactionKind::Credit => amount,
            TransactionKind::Debit => -amount,
        };
        self.fabric.emit(
            user_id,
            Event::TokensBalanceUpdated {
                balance: new_balance,
                change,
                reason: reason_code.as_str().to_string(),
                timestamp: created.created_at,
            },
        );

        Ok(MutationOutcome {
            balance: new_balance,
            tx_id: created.id,
        })
    }

    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: i64,
        reason_code: ReasonCode,
        opts: LedgerMutationOptions,
    ) -> Result<MutationOutcome> {
        self.apply_mutation(user_id, TransactionKind::Credit, amount, reason_code, opts)
            .await
    }

    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: i64,
        reason_code: ReasonCode,
        opts: LedgerMutationOptions,
    ) -> Result<MutationOutcome> {
        self.apply_mutation(user_id, TransactionKind::Debit, amount, reason_code, opts)
            .await
    }

    /// Idempotent per user (spec §4.C): a second call is a silent no-op
    /// returning the current balance, never a second credit.
    pub async fn grant_signup_bonus(&self, user_id: Uuid, amount: i64) -> Result<MutationOutcome> {
        let mut tx = self.repo.begin().await?;
        let balance = repo_tx::lock_balance_row_tx(&mut tx, user_id).await?;

        if repo_tx::has_signup_bonus_tx(&mut tx, user_id).await? {
            tx.commit().await?;
            return Ok(MutationOutcome {
                balance: balance.balance,
                tx_id: Uuid::nil(),
            });
        }
        tx.rollback().await?;

        self.credit(
            user_id,
            amount,
            ReasonCode::SignupBonus,
            LedgerMutationOptions {
                idempotency_key: Some(format!("signup_bonus:{}", user_id)),
                ..Default::default()
            },
        )
        .await
    }
}

