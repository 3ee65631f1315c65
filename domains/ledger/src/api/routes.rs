//! Route definitions for the Token Ledger API (spec §6).

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::LedgerState;

pub fn routes() -> Router<LedgerState> {
    Router::new()
        .route("/api/tokens/balance", get(handlers::get_balance))
        .route("/api/tokens/history", get(handlers::list_transactions))
        .route("/api/tokens/admin/topup", post(handlers::admin_topup))
        .route("/api/tokens/signup-bonus", post(handlers::signup_bonus))
}
