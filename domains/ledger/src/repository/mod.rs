//! Repository access for the Token Ledger domain.

pub mod transactions;

use sqlx::{PgPool, Postgres, Transaction};
use studio_common::cursor::Cursor;
use studio_common::db::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{ReasonCode, TokenTransaction, TransactionKind, UserTokenBalance};

#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

/// Filters for `ListTransactions` (spec §4.C).
#[derive(Debug, Clone, Default)]
pub struct TransactionListFilter {
    pub kind: Option<TransactionKind>,
    pub reason_code: Option<ReasonCode>,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Read-only snapshot of a user's balance, creating the row with
    /// zeros if it doesn't exist yet (spec §4.C `GetBalance`). Does not
    /// lock the row: callers that need the lock for a mutation use
    /// `transactions::lock_balance_row_tx` inside their own transaction.
    pub async fn get_balance(&self, user_id: Uuid) -> Result<UserTokenBalance, RepositoryError> {
        if let Some(existing) = sqlx::query_as::<_, UserTokenBalance>(
            r#"
            SELECT user_id, balance, total_earned, total_spent, created_at, updated_at
            FROM user_token_balances WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(existing);
        }

        let mut tx = self.pool.begin().await?;
        let balance = transactions::lock_balance_row_tx(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Cursor-paginated transaction history, newest first (spec §4.C
    /// `ListTransactions`: ordered by `createdAt desc, id desc`).
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionListFilter,
        limit: i64,
        cursor: Option<Cursor>,
    ) -> Result<Vec<TokenTransaction>, RepositoryError> {
        let (created_at, id) = match cursor {
            Some(c) => (Some(c.created_at), Some(c.id)),
            None => (None, None),
        };

        let rows: Vec<TokenTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, kind, amount, balance_after, reason_code,
                   reference_type, reference_id, notes, admin_id, created_at
            FROM token_transactions
            WHERE user_id = $1
              AND ($2::transaction_kind IS NULL OR kind = $2)
              AND ($3::reason_code IS NULL OR reason_code = $3)
              AND ($4::timestamptz IS NULL OR (created_at, id) < ($4, $5))
            ORDER BY created_at DESC, id DESC
            LIMIT $6
            "#,
        )
        .bind(user_id)
        .bind(filter.kind)
        .bind(filter.reason_code)
        .bind(created_at)
        .bind(id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
