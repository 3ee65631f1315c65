//! WebSocket upgrade handler: `/realtime?token={jwt}`. Browsers cannot set
//! an `Authorization` header on a WebSocket upgrade request, so the bearer
//! token travels as a query parameter instead — the one deviation from
//! the REST endpoints' header-based auth, unavoidable for this transport.
//!
//! Generic over any state `S` exposing `AuthBackend` and
//! `Arc<RoomRegistry>` via `FromRef`, the same nested-state pattern
//! `studio_auth`'s extractors use.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRef, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use studio_auth::AuthBackend;

use crate::rooms::RoomRegistry;
use crate::Event;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: String,
}

pub async fn handler<S>(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<S>,
) -> Response
where
    S: Send + Sync + Clone + 'static,
    AuthBackend: FromRef<S>,
    Arc<RoomRegistry>: FromRef<S>,
{
    let backend = AuthBackend::from_ref(&state);
    let registry = Arc::<RoomRegistry>::from_ref(&state);

    match backend.authenticate(&query.token).await {
        Ok(context) => {
            let user_id = context.user.id;
            ws.on_upgrade(move |socket| handle_socket(socket, user_id, registry))
        }
        Err(e) => {
            tracing::warn!(error = %e, "realtime websocket handshake rejected");
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, user_id: uuid::Uuid, registry: Arc<RoomRegistry>) {
    tracing::info!(%user_id, "realtime socket connected");

    let mut output_rx = registry.subscribe(user_id);
    registry.emit(user_id, Event::UserOnline { user_id });

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            event = output_rx.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize realtime event");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sender.send(Message::Text(payload.into())).await {
                            tracing::debug!(%user_id, error = %e, "failed to send realtime event, closing");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(dropped)) => {
                        tracing::warn!(%user_id, dropped, "realtime socket lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(_)) => {
                        // Server-push only channel: any client frame besides
                        // ping/close is ignored.
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%user_id, error = %e, "realtime socket error");
                        break;
                    }
                }
            }
        }
    }

    registry.emit(user_id, Event::UserOffline { user_id });
    tracing::info!(%user_id, "realtime socket disconnected");
}
