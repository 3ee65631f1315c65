//! JWT claims types

use serde::{Deserialize, Serialize};

/// Claims carried by tokens minted by the external auth system. We only
/// verify these, never issue them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    pub email: Option<String>,
    /// Issued at
    pub iat: u64,
    /// Expires at
    pub exp: u64,
    /// Audience
    pub aud: String,
    /// Role claim as asserted by the issuer (informational only — the
    /// authoritative role lives on the `users` row).
    pub role: String,
}
