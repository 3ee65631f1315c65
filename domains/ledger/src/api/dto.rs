//! Request/response DTOs for the ledger HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::entities::{ReasonCode, TokenTransaction, TransactionKind, UserTokenBalance};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
}

impl From<UserTokenBalance> for BalanceResponse {
    fn from(b: UserTokenBalance) -> Self {
        Self {
            balance: b.balance,
            total_earned: b.total_earned,
            total_spent: b.total_spent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub reason_code: ReasonCode,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<TokenTransaction> for TransactionResponse {
    fn from(t: TokenTransaction) -> Self {
        Self {
            id: t.id,
            kind: t.kind,
            amount: t.amount,
            balance_after: t.balance_after,
            reason_code: t.reason_code,
            reference_type: t.reference_type,
            reference_id: t.reference_id,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionHistoryResponse {
    pub transactions: Vec<TransactionResponse>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub reason: Option<ReasonCode>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminTopupRequest {
    pub user_id: Uuid,
    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,
    pub notes: Option<String>,
}

/// Body for `POST /api/tokens/signup-bonus` (spec §4.C `GrantSignupBonus`).
/// The signup event itself originates outside this workspace (spec §1
/// non-goals); the external system that provisions the `users` row calls
/// this once per new account.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupBonusRequest {
    pub user_id: Uuid,
}
