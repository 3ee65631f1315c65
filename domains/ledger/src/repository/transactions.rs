//! Transactional free functions for the Token Ledger (Zero2Prod pattern,
//! following `domains/teams/src/repository/transactions.rs`).
//!
//! `lock_balance_row_tx` is the one function every mutation calls first;
//! it is the sole cross-worker contended resource for a given user (spec
//! §5), and every other step in `TokenLedger::credit`/`debit` happens
//! while holding its lock.

use chrono::Utc;
use sqlx::{Postgres, Transaction};
use studio_common::db::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{ReasonCode, TokenTransaction, TransactionKind, UserTokenBalance};

/// Ensure a balance row exists, then lock it `FOR UPDATE`. Safe to call
/// concurrently: the `ON CONFLICT DO NOTHING` insert means only one
/// caller ever creates the row, and every caller then locks the same row.
pub async fn lock_balance_row_tx(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<UserTokenBalance, RepositoryError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO user_token_balances (user_id, balance, total_earned, total_spent, created_at, updated_at)
        VALUES ($1, 0, 0, 0, $2, $2)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut **transaction)
    .await?;

    let balance: UserTokenBalance = sqlx::query_as(
        r#"
        SELECT user_id, balance, total_earned, total_spent, created_at, updated_at
        FROM user_token_balances
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(balance)
}

/// Probe for an existing transaction under `(user_id, idempotencyKey)`
/// (spec §4.C step 3). Call only while holding the balance row lock, so
/// the probe and the eventual insert observe the same snapshot.
pub async fn find_by_idempotency_key_tx(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    idempotency_key: &str,
) -> Result<Option<TokenTransaction>, RepositoryError> {
    let found: Option<TokenTransaction> = sqlx::query_as(
        r#"
        SELECT id, user_id, kind, amount, balance_after, reason_code,
               reference_type, reference_id, notes, admin_id, created_at
        FROM token_transactions
        WHERE user_id = $1 AND notes ->> 'idempotencyKey' = $2
        "#,
    )
    .bind(user_id)
    .bind(idempotency_key)
    .fetch_optional(&mut **transaction)
    .await?;

    Ok(found)
}

/// Refuse a second `signup_bonus` credit regardless of idempotency key
/// (spec §4.C `GrantSignupBonus`: "idempotent per user").
pub async fn has_signup_bonus_tx(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<bool, RepositoryError> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM token_transactions
        WHERE user_id = $1 AND reason_code = 'signup_bonus'
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut **transaction)
    .await?;
    Ok(row.0 > 0)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_transaction_tx(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    kind: TransactionKind,
    amount: i64,
    balance_after: i64,
    reason_code: ReasonCode,
    reference_type: Option<&str>,
    reference_id: Option<Uuid>,
    notes: serde_json::Value,
    admin_id: Option<Uuid>,
) -> Result<TokenTransaction, RepositoryError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let created: TokenTransaction = sqlx::query_as(
        r#"
        INSERT INTO token_transactions
            (id, user_id, kind, amount, balance_after, reason_code,
             reference_type, reference_id, notes, admin_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, user_id, kind, amount, balance_after, reason_code,
                  reference_type, reference_id, notes, admin_id, created_at
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(kind)
    .bind(amount)
    .bind(balance_after)
    .bind(reason_code)
    .bind(reference_type)
    .bind(reference_id)
    .bind(sqlx::types::Json(notes))
    .bind(admin_id)
    .bind(now)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(created)
}

/// Apply the computed balance delta to the (already-locked) balance row.
pub async fn update_balance_tx(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    new_balance: i64,
    earned_delta: i64,
    spent_delta: i64,
) -> Result<UserTokenBalance, RepositoryError> {
    let updated: UserTokenBalance = sqlx::query_as(
        r#"
        UPDATE user_token_balances
        SET balance = $2,
            total_earned = total_earned + $3,
            total_spent = total_spent + $4,
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING user_id, balance, total_earned, total_spent, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(new_balance)
    .bind(earned_delta)
    .bind(spent_delta)
    .fetch_one(&mut **transaction)
    .await?;

    Ok(updated)
}
