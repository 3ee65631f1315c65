//! Auth CQRS read-model types
//!
//! The core never writes to `users` — identity, role, and status are
//! owned and mutated by an external system. We only read enough of the
//! row to authorize a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role enumerated on the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Mod,
    Admin,
    Owner,
    Warehouse,
}

impl UserRole {
    /// Roles permitted to perform administrative ledger/operation-type actions.
    pub fn can_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Owner)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Mod => write!(f, "mod"),
            UserRole::Admin => write!(f, "admin"),
            UserRole::Owner => write!(f, "owner"),
            UserRole::Warehouse => write!(f, "warehouse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

/// Lightweight identity for authenticated users.
///
/// Contains the fields needed by auth middleware and most handlers.
/// Handlers needing other `User` fields load from their own domain's
/// repository by `id`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuthIdentity {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub status: UserStatus,
}
