//! Token Ledger domain (spec §4.C): append-only balance and transaction
//! log with idempotent debit/credit and a signup bonus hook.

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;

pub use domain::entities::{
    LedgerMutationOptions, ReasonCode, TokenTransaction, TransactionKind, UserTokenBalance,
};
pub use repository::{LedgerRepository, TransactionListFilter};
pub use service::{MutationOutcome, TokenLedger};

pub use api::{routes, LedgerState};
