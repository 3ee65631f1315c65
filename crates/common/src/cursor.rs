//! Opaque pagination cursors shared by list endpoints that page over
//! `(created_at, id)` tuples — the token ledger's transaction history and
//! the generation timeline both page this way.
//!
//! A cursor encodes the `(created_at, id)` of the last row returned so the
//! next page can resume with a `WHERE (created_at, id) < (cursor.ts,
//! cursor.id)` predicate. The wire format is base64 so callers treat it as
//! an opaque string, never parsing or constructing one by hand.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// Encode as an opaque, URL-safe token.
    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", self.created_at.to_rfc3339(), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode a token previously produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> Result<Self, Error> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::Validation("invalid pagination cursor".to_string()))?;
        let raw = String::from_utf8(raw)
            .map_err(|_| Error::Validation("invalid pagination cursor".to_string()))?;

        let (ts, id) = raw
            .split_once('|')
            .ok_or_else(|| Error::Validation("invalid pagination cursor".to_string()))?;

        let created_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| Error::Validation("invalid pagination cursor".to_string()))?
            .with_timezone(&Utc);
        let id = Uuid::parse_str(id)
            .map_err(|_| Error::Validation("invalid pagination cursor".to_string()))?;

        Ok(Self { created_at, id })
    }
}
