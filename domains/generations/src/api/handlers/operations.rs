//! Operation type catalog handler (spec SS6 `GET /api/generate/operations`).

use axum::extract::State;
use axum::Json;
use studio_common::Result;

use crate::api::dto::{OperationTypeResponse, OperationsCatalogResponse};
use crate::api::state::GenerationsState;

pub async fn list_operations(
    State(state): State<GenerationsState>,
) -> Result<Json<OperationsCatalogResponse>> {
    let operations = state.operation_types.list_active().await?;
    Ok(Json(OperationsCatalogResponse {
        operations: operations.into_iter().map(OperationTypeResponse::from).collect(),
    }))
}
