//! Ledger HTTP handlers (spec §6: `/api/tokens/*`).

use axum::extract::{Query, State};
use axum::Json;
use studio_auth::{AdminUser, AuthUser};
use studio_common::cursor::Cursor;
use studio_common::{Result, ValidatedJson};

use crate::api::dto::{
    AdminTopupRequest, BalanceResponse, ListTransactionsParams, SignupBonusRequest,
    TransactionHistoryResponse, TransactionResponse,
};
use crate::api::state::LedgerState;
use crate::domain::entities::{LedgerMutationOptions, ReasonCode};
use crate::repository::TransactionListFilter;

pub async fn get_balance(
    AuthUser(ctx): AuthUser,
    State(state): State<LedgerState>,
) -> Result<Json<BalanceResponse>> {
    let balance = state.ledger.get_balance(ctx.user.id).await?;
    Ok(Json(balance.into()))
}

pub async fn list_transactions(
    AuthUser(ctx): AuthUser,
    State(state): State<LedgerState>,
    Query(params): Query<ListTransactionsParams>,
) -> Result<Json<TransactionHistoryResponse>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let cursor = params
        .cursor
        .as_deref()
        .map(Cursor::decode)
        .transpose()?;

    let filter = TransactionListFilter {
        kind: params.kind,
        reason_code: params.reason,
    };

    let (rows, next_cursor) = state
        .ledger
        .list_transactions(ctx.user.id, &filter, limit, cursor)
        .await?;

    Ok(Json(TransactionHistoryResponse {
        transactions: rows.into_iter().map(TransactionResponse::from).collect(),
        next_cursor: next_cursor.map(|c| c.encode()),
    }))
}

/// Admin credit (spec §6 `POST /api/tokens/admin/topup`, §4.C `Credit`
/// with `reasonCode=admin_topup`). Restricted to `AdminUser`.
pub async fn admin_topup(
    AdminUser(ctx): AdminUser,
    State(state): State<LedgerState>,
    ValidatedJson(req): ValidatedJson<AdminTopupRequest>,
) -> Result<Json<BalanceResponse>> {
    let outcome = state
        .ledger
        .credit(
            req.user_id,
            req.amount,
            ReasonCode::AdminTopup,
            LedgerMutationOptions {
                admin_id: Some(ctx.user.id),
                notes: req.notes.map(|n| serde_json::json!({ "note": n })),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(admin_id = %ctx.user.id, user_id = %req.user_id, tx_id = %outcome.tx_id, amount = req.amount, "admin topup applied");

    let balance = state.ledger.get_balance(req.user_id).await?;
    Ok(Json(balance.into()))
}

/// Grant the one-time signup bonus (spec §4.C `GrantSignupBonus`, §8
/// scenario S1). Restricted to `AdminUser` since the caller is the
/// external identity system, not the new account holder itself.
pub async fn signup_bonus(
    AdminUser(_ctx): AdminUser,
    State(state): State<LedgerState>,
    ValidatedJson(req): ValidatedJson<SignupBonusRequest>,
) -> Result<Json<BalanceResponse>> {
    let outcome = state
        .ledger
        .grant_signup_bonus(req.user_id, state.signup_bonus_amount)
        .await?;

    tracing::info!(user_id = %req.user_id, tx_id = %outcome.tx_id, amount = state.signup_bonus_amount, "signup bonus granted");

    let balance = state.ledger.get_balance(req.user_id).await?;
    Ok(Json(balance.into()))
}
