//! Realtime Event Fabric (spec §4.H)
//!
//! Per-user rooms (`user:{userId}`) delivering server-pushed events over a
//! long-lived WebSocket. No teacher crate in the workspace speaks
//! WebSocket; this module is grounded instead on
//! `shepherdjerred-monorepo/packages/multiplexer/src/api/ws_events.rs`
//! (broadcast-channel-per-room shape) and
//! `.../clauderon/src/api/ws_console.rs` (the `tokio::select!` dual-loop
//! that interleaves outbound broadcast delivery with inbound client
//! frames). Delivery is at-most-once per socket: if nobody is subscribed
//! to a user's room the event is dropped, never queued.

pub mod rooms;
pub mod ws;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One produced image, as carried by `generation.completed`'s `result.images`
/// (spec §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedImage {
    pub image_id: Uuid,
    pub image_url: String,
    pub mime: String,
    pub size_bytes: i64,
}

/// `result.tokens` (spec §4.H): what this generation cost and what's left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensSummary {
    pub used: i64,
    pub remaining: i64,
}

/// `generation.completed`'s `result` payload (spec §4.H), letting a realtime
/// subscriber render the finished generation without a follow-up
/// `GET /api/generate/queue/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub images: Vec<CompletedImage>,
    pub tokens: TokensSummary,
    pub metadata: serde_json::Value,
}

/// Event catalog (spec §4.H), unchanged from the source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    GenerationProgress {
        generation_id: Uuid,
        percent: u8,
        stage: String,
    },
    GenerationCompleted {
        generation_id: Uuid,
        output_upload_ids: Vec<Uuid>,
        result: GenerationResult,
        timestamp: DateTime<Utc>,
    },
    GenerationFailed {
        generation_id: Uuid,
        reason: String,
    },
    TokensBalanceUpdated {
        balance: i64,
        change: i64,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    UserOnline {
        user_id: Uuid,
    },
    UserOffline {
        user_id: Uuid,
    },
}

impl Event {
    /// The user room this event belongs in, when the event carries one.
    /// `UserOnline`/`UserOffline` are broadcast to all subscribers of the
    /// named user's room by the same mechanism as any other event; there
    /// is no separate presence channel.
    pub fn name(&self) -> &'static str {
        match self {
            Event::GenerationProgress { .. } => "generation.progress",
            Event::GenerationCompleted { .. } => "generation.completed",
            Event::GenerationFailed { .. } => "generation.failed",
            Event::TokensBalanceUpdated { .. } => "tokens.balance.updated",
            Event::UserOnline { .. } => "user.online",
            Event::UserOffline { .. } => "user.offline",
        }
    }
}

/// Public surface of the event fabric (spec §9 redesign flag): `Emit`,
/// `EmitAll`, and the connection-manager sub-interface `IsOnline`/
/// `Disconnect`. Implemented by `rooms::RoomRegistry`.
#[async_trait::async_trait]
pub trait EventFabric: Send + Sync {
    /// Deliver `event` to every socket currently subscribed to
    /// `user:{user_id}`. Silently a no-op if nobody is connected.
    fn emit(&self, user_id: Uuid, event: Event);

    /// Deliver `event` to every connected user's room. Used for
    /// operator-facing broadcasts (e.g. maintenance notices); the domain
    /// layer does not call this today.
    fn emit_all(&self, event: Event);

    fn is_online(&self, user_id: Uuid) -> bool;

    /// Force-close every socket in a user's room (used by account
    /// suspension flows outside this crate's scope; exposed so callers
    /// can compose it in).
    fn disconnect(&self, user_id: Uuid);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_matches_catalog() {
        let e = Event::GenerationProgress {
            generation_id: Uuid::new_v4(),
            percent: 20,
            stage: "calling_provider".to_string(),
        };
        assert_eq!(e.name(), "generation.progress");
    }

    #[test]
    fn test_event_serializes_tagged() {
        let e = Event::TokensBalanceUpdated {
            balance: 100,
            change: -200,
            reason: "spend_generation".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "tokens_balance_updated");
        assert!(json["payload"]["balance"].is_number());
        assert_eq!(json["payload"]["change"], -200);
    }

    #[test]
    fn test_generation_completed_serializes_result() {
        let e = Event::GenerationCompleted {
            generation_id: Uuid::new_v4(),
            output_upload_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            result: GenerationResult {
                images: vec![CompletedImage {
                    image_id: Uuid::new_v4(),
                    image_url: "https://cdn.example.com/a.png".to_string(),
                    mime: "image/png".to_string(),
                    size_bytes: 1024,
                }],
                tokens: TokensSummary { used: 200, remaining: 800 },
                metadata: serde_json::json!({ "numberOfImages": 2 }),
            },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "generation_completed");
        assert_eq!(json["payload"]["result"]["tokens"]["remaining"], 800);
        assert_eq!(json["payload"]["result"]["images"][0]["mime"], "image/png");
    }
}
