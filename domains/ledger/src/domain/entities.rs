//! Token Ledger entities (spec §3: UserTokenBalance, TokenTransaction).
//!
//! Grounded on `domains/jobs/src/domain/entities.rs`'s `Usage` entity for
//! the general shape of a metered-resource accounting row, and on
//! `domains/teams/src/domain/entities.rs`'s `Team.credits` field as the
//! closest existing single-integer balance this workspace tracks — both
//! generalized here into a full double-entry ledger with an append-only
//! transaction log, which neither teacher entity has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

/// One row per user. `total_earned - total_spent == balance` always holds;
/// enforced by `TokenLedger::credit`/`debit`, never by a DB constraint,
/// since Postgres check constraints can't reference a second table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserTokenBalance {
    pub user_id: Uuid,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserTokenBalance {
    pub fn zero(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

/// Reason codes (spec §3), unchanged. `Admin` actions (`AdminTopup`,
/// `AdminCorrection`) are the only ones an `AdminUser` extractor may
/// originate; the rest are produced by the ledger's own callers
/// (`GrantSignupBonus`, the generation worker's spend/refund paths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "reason_code", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SignupBonus,
    AdminTopup,
    AdminCorrection,
    SpendGeneration,
    Refund,
}

impl ReasonCode {
    /// Matches the `serde(rename_all = "snake_case")` wire form; used to
    /// populate `tokens.balance.updated`'s `reason` field (spec §4.H),
    /// which travels over the realtime fabric as a plain string rather
    /// than this enum (`crates/realtime` sits below `domains/ledger` in
    /// the dependency graph and can't name it).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignupBonus => "signup_bonus",
            Self::AdminTopup => "admin_topup",
            Self::AdminCorrection => "admin_correction",
            Self::SpendGeneration => "spend_generation",
            Self::Refund => "refund",
        }
    }
}

/// Append-only ledger row. Never updated or deleted after insertion;
/// `balance_after` is frozen at the value observed when this row was
/// applied, so history reconstruction never needs to replay amounts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub reason_code: ReasonCode,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: sqlx::types::Json<serde_json::Value>,
    pub admin_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TokenTransaction {
    /// Extracts `notes.idempotencyKey`, the only field callers probe for
    /// the at-most-once-application invariant.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.notes.0.get("idempotencyKey").and_then(|v| v.as_str())
    }
}

/// Inputs for `TokenLedger::credit`/`debit` (spec §4.C).
#[derive(Debug, Clone, Default)]
pub struct LedgerMutationOptions {
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<serde_json::Value>,
    pub admin_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}
