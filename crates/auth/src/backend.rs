//! Concrete authentication backend
//!
//! Wraps `PgPool` + `AuthConfig` and owns the one query auth needs: a
//! read-only lookup of the `users` row identified by a verified token's
//! subject claim. The core never creates or mutates this row — it is
//! provisioned by an external system (spec §1 non-goals).

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::context::AuthContext;
use crate::error::AuthError;
use crate::types::{AuthIdentity, UserStatus};

/// Concrete authentication backend.
///
/// Domain states expose this via `FromRef`:
/// ```ignore
/// impl FromRef<MyDomainState> for AuthBackend {
///     fn from_ref(state: &MyDomainState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AuthBackend {
    pool: PgPool,
    config: AuthConfig,
}

impl AuthBackend {
    pub fn new(pool: PgPool, config: AuthConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Find user identity by ID (CQRS read model — lightweight subset of User).
    pub(crate) async fn find_user(&self, id: Uuid) -> Result<Option<AuthIdentity>, AuthError> {
        let user: Option<AuthIdentity> = sqlx::query_as(
            r#"
            SELECT id, email, username, role as "role", status as "status"
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %id, "Failed to load user");
            AuthError::UserLoadError
        })?;

        Ok(user)
    }

    /// Verify a bearer token and load the authenticated context. Public so
    /// callers outside the axum extractor path (the realtime WebSocket
    /// handshake, which authenticates via a query parameter instead of a
    /// header) can reuse the same verification.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.authenticate_jwt(token).await
    }

    pub(crate) async fn authenticate_jwt(&self, token: &str) -> Result<AuthContext, AuthError> {
        let claims = crate::jwt::validate_jwt_token(token, &self.config)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidUserId)?;

        let user = self
            .find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.status != UserStatus::Active {
            return Err(AuthError::UserInactive);
        }

        Ok(AuthContext::new(user))
    }
}
