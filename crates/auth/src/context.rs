//! Authorization context for authenticated users

use uuid::Uuid;

use crate::types::{AuthIdentity, UserRole};

/// Represents an authenticated user context.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: AuthIdentity,
}

impl AuthContext {
    pub fn new(user: AuthIdentity) -> Self {
        Self { user }
    }

    /// Check if user's role permits administrative actions (ledger
    /// admin credit/correction, operation type catalog management).
    pub fn is_admin(&self) -> bool {
        self.user.role.can_admin()
    }

    /// Every Generation/Upload is exclusively owned by its creating user;
    /// ownership never transfers. This is the only access-control check
    /// the core performs on user-owned resources.
    pub fn owns(&self, resource_user_id: Uuid) -> bool {
        self.user.id == resource_user_id
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }
}
