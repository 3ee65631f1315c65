//! Ledger domain state and auth backend integration. Mirrors
//! `domains/jobs/src/api/middleware.rs`'s `JobsState` shape.

use axum::extract::FromRef;
use studio_auth::AuthBackend;

use crate::service::TokenLedger;

#[derive(Clone)]
pub struct LedgerState {
    pub ledger: TokenLedger,
    pub auth: AuthBackend,
    pub signup_bonus_amount: i64,
}

impl FromRef<LedgerState> for AuthBackend {
    fn from_ref(state: &LedgerState) -> Self {
        state.auth.clone()
    }
}
