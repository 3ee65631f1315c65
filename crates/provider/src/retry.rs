//! Provider error classification and backoff (spec §4.B).
//!
//! Classification is substring matching on the underlying error message —
//! kept exactly as spec.md states it, isolated behind a single function so
//! swapping in a structured SDK error type later (per spec.md §9's own
//! open question) is a one-function change, per DESIGN.md's resolution.

use std::time::Duration;

const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "timeout",
    "network",
    "connection",
    "temporary",
    "service unavailable",
    "quota exceeded",
];

const PERMANENT_MARKERS: &[&str] = &[
    "invalid api key",
    "permission denied",
    "not found",
    "invalid request",
    "bad request",
    "unsupported",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
    /// Doesn't match either list — treated conservatively as permanent so
    /// we don't retry unknown failure modes indefinitely.
    Unknown,
}

pub fn classify_provider_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorClass::Transient;
    }
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorClass::Permanent;
    }
    ErrorClass::Unknown
}

/// Exponential backoff: `min(1000 * 2^(n-1), 5000)` ms for attempt `n`
/// (1-indexed — the delay *before* attempt `n+1`).
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let ms = 1000u64.saturating_mul(1u64 << attempt.saturating_sub(1));
    Duration::from_millis(ms.min(5000))
}

pub const MAX_ATTEMPTS: u32 = 3;
