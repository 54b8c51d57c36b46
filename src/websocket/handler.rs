use std::sync::Arc;
use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use tokio::sync::mpsc;
use tracing::{info, warn, debug, error};
use futures_util::{StreamExt, SinkExt};
use uuid::Uuid;

use crate::AppState;
use crate::models::ReceivedMessage;
use crate::websocket::msg_ping_handler::handle_ping_message;


/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {

    // Generate unique connection ID to identify this client
    let connection_id = Uuid::new_v4().to_string();
    info!("WebSocket connection established with connection_id: {}", connection_id);

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Everything the engine or the ping handler wants to say goes through this channel
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if app_state.engine.connect(connection_id.clone(), outbound_tx.clone()).await.is_err() {
        error!("Session dispatcher unavailable, dropping connection {}", connection_id);
        return;
    }

    let engine = app_state.engine.clone();
    let reader_id = connection_id.clone();

    // Decode incoming frames and hand them to the dispatcher
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Read error on connection {}: {}", reader_id, e);
                    break;
                }
            };

            let json_msg: ReceivedMessage = match serde_json::from_str(&text) {
                Ok(json_msg) => json_msg,
                Err(e) => {
                    warn!("Dropping malformed message on connection {}: {}", reader_id, e);
                    continue;
                }
            };
            debug!("Received {} on connection {} for {:?}", json_msg.kind(), reader_id, json_msg.document_id());

            match json_msg {
                ReceivedMessage::Ping => handle_ping_message(&reader_id, &outbound_tx),
                message => {
                    if engine.inbound(reader_id.clone(), message).await.is_err() {
                        error!("Session dispatcher unavailable for connection {}", reader_id);
                        break;
                    }
                }
            }
        }
    });

    // Forward outbound frames to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut recv_task) => send_task.abort(),
        _ = (&mut send_task) => recv_task.abort(),
    };

    if app_state.engine.disconnect(connection_id.clone()).await.is_err() {
        error!("Session dispatcher unavailable while closing {}", connection_id);
    }
    info!("WebSocket connection {} terminated", connection_id);
}
