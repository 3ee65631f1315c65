//! Generations domain state and auth backend integration. Mirrors
//! `domains/ledger/src/api/state.rs`'s `LedgerState` shape.

use std::sync::Arc;

use axum::extract::FromRef;
use studio_auth::AuthBackend;
use studio_queue::JobQueue;
use studio_storage::ObjectStore;

use crate::repository::{GenerationsRepository, OperationTypeRepository, UploadRepository};

#[derive(Clone)]
pub struct GenerationsState {
    pub repo: GenerationsRepository,
    pub operation_types: OperationTypeRepository,
    pub uploads: UploadRepository,
    pub storage: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn JobQueue>,
    pub auth: AuthBackend,
}

impl FromRef<GenerationsState> for AuthBackend {
    fn from_ref(state: &GenerationsState) -> Self {
        state.auth.clone()
    }
}
