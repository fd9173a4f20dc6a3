//! Live preview: a WebSocket carrying bus frames between the editor backend and
//! the preview surface, plus an endpoint for editor-initiated messages.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, HeaderMap},
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{success, ApiResult};
use crate::bus::{BusFrame, BusRegistry, ChannelTarget, MessageType, SendOutcome};
use crate::errors::AppError;
use crate::models::Store;
use crate::AppState;

/// GET /api/stores/{subdomain}/preview/ws - Attach a preview surface.
pub async fn preview_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let store = state.loader.store(&subdomain).await?;
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let buses = Arc::clone(&state.buses);

    Ok(ws.on_upgrade(move |socket| handle_preview(socket, buses, store, origin)))
}

async fn handle_preview(socket: WebSocket, buses: Arc<BusRegistry>, store: Store, origin: String) {
    tracing::info!("Preview connected for store {}", store.subdomain);

    let (tx, mut rx) = mpsc::unbounded_channel::<BusFrame>();
    let (bus, token) = buses.attach(&store.id, Arc::new(ChannelTarget::new(tx)));

    let (mut sink, mut stream) = socket.split();

    // Writer task: forward bus frames to the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to encode bus frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!("Preview socket closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let outcome = bus.receive(&origin, text.as_str());
                tracing::trace!("Inbound preview frame: {:?}", outcome);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Preview socket error: {}", e);
                break;
            }
        }
    }

    buses.release(&store.id, token);
    writer.abort();
    tracing::info!("Preview disconnected for store {}", store.subdomain);
}

/// Request body for pushing a message to the preview.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewMessageRequest {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewMessageResult {
    pub ready: bool,
    pub outcome: SendOutcome,
}

/// POST /api/stores/{subdomain}/preview/messages - Send an editor message
/// (e.g. `SCROLL_TO_SECTION`, `TOGGLE_SELECTOR_MODE`) to the preview, waiting a
/// bounded time for it to become ready. If it never does, the message stays
/// queued for when it is.
pub async fn send_preview_message(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
    Json(request): Json<PreviewMessageRequest>,
) -> ApiResult<PreviewMessageResult> {
    if !request.message_type.is_editor_message() {
        return Err(AppError::Validation(format!(
            "{:?} is sent by the preview, not the editor",
            request.message_type
        )));
    }

    let store = state.loader.store(&subdomain).await?;
    let Some(bus) = state.buses.get(&store.id) else {
        return Err(AppError::not_found("Preview for store", &store.subdomain));
    };

    let ready = bus.wait_for_ready().await;
    let outcome = bus.send(request.message_type, request.payload, None);
    success(PreviewMessageResult { ready, outcome })
}
