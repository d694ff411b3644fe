use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::application::ArenaService;
use crate::broadcast::{ChannelSink, MessageSink};
use crate::errors::{NetworkError, NetworkResult};
use crate::protocol::{decode_client, encode_server, ServerMessage};
use crate::registry::SessionRegistry;

pub async fn ws_handler(ws: WebSocketUpgrade, State(service): State<ArenaService>) -> impl IntoResponse {
    let registry = service.registry().clone();
    ws.on_upgrade(move |socket| handle_connection(socket, registry))
}

/// Runs one client connection: a writer task draining the outbound channel and
/// a reader loop feeding the registry. Whichever ends first cancels the other,
/// then the connection is released from its session.
pub async fn handle_connection(socket: WebSocket, registry: SessionRegistry) {
    let connection_id = format!("conn_{}", uuid::Uuid::new_v4());
    let (mut sender, mut receiver) = socket.split();

    let (sink, mut outbound) = ChannelSink::with_capacity(connection_id.clone(), registry.outbound_capacity());
    let sink = Arc::new(sink);

    let assignment = match registry.on_connect(connection_id.clone(), sink.clone()).await {
        Ok(assignment) => assignment,
        Err(e) => {
            log::error!("❌ Could not seat {}: {}", connection_id, e);
            let _ = send_message(&mut sender, &ServerMessage::error(e.to_string())).await;
            return;
        }
    };
    log::info!(
        "🔌 WebSocket connected: {} ({} in match {})",
        connection_id,
        assignment.role,
        assignment.match_id
    );

    let writer_id = connection_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = send_message(&mut sender, &message).await {
                log::debug!("Writer for {} stopped: {}", writer_id, e);
                break;
            }
        }
    });

    let reader_id = connection_id.clone();
    let reader_registry = registry.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_text(&reader_registry, &reader_id, sink.as_ref(), text.as_str()).await;
                }
                Ok(Message::Binary(_)) => {
                    let _ = sink
                        .send(ServerMessage::error("Binary frames are not supported"))
                        .await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "⚠️ {}",
                        NetworkError::connection_lost(&reader_id, e.to_string())
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut write_task => {
            read_task.abort();
        }
        _ = &mut read_task => {
            write_task.abort();
        }
    }

    registry.on_disconnect(&connection_id).await;
    log::info!("🔌 WebSocket disconnected: {}", connection_id);
}

/// Decodes one text frame and hands it to the session. Protocol errors are
/// answered on the same connection, which stays open.
async fn handle_text(registry: &SessionRegistry, connection_id: &str, sink: &dyn MessageSink, text: &str) {
    log::debug!("📥 {}: {}", connection_id, text);
    let result = match decode_client(text) {
        Ok(message) => registry.on_message(connection_id, message).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::error!("❌ Message from {} dropped: {}", connection_id, e);
        let _ = sink.send(ServerMessage::error(e.to_string())).await;
    }
}

async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> NetworkResult<()> {
    let json = encode_server(message)?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| NetworkError::connection_lost("socket", e.to_string()))
}
