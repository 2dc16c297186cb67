use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct WatchQuery {
    pub recipient_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.recipient_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, recipient_id: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.notifications.subscribe());

    info!(recipient_id = ?recipient_id, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let notification = match event {
                Ok(notification) => notification,
                Err(err) => {
                    warn!(error = %err, "websocket subscriber lagged");
                    continue;
                }
            };
            if recipient_id.is_some_and(|id| id != notification.recipient_id) {
                continue;
            }

            let json = match serde_json::to_string(&notification) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notification for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(recipient_id = ?recipient_id, "websocket client disconnected");
}
