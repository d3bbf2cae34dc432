use super::AppState;
use crate::notify::{ClientMessage, ServerMessage};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// GET /ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<AppState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// Handle one dashboard connection: initial status, then client requests
/// and broadcast updates until either side goes away.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let notifier = Arc::clone(state.service.notifier());
    let (connection_id, mut outbound) = notifier.register();

    let initial = match state.service.current_status().await {
        Ok(snapshot) => ServerMessage::InitialStatus(snapshot),
        Err(e) => {
            error!(error = %e, "Failed to build initial status");
            ServerMessage::error(e.to_string())
        }
    };
    if let Err(e) = send(&mut socket, &initial).await {
        warn!(connection_id = %connection_id, error = %e, "Failed to send initial status");
        notifier.unregister(&connection_id);
        return;
    }

    loop {
        tokio::select! {
            // Incoming client messages
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_client_message(&mut socket, &state, &text).await {
                            error!(error = %e, "Failed to reply to client message");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(connection_id = %connection_id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Broadcast updates from the notifier
            outbound_msg = outbound.recv() => {
                let Some(json) = outbound_msg else {
                    break;
                };
                if let Err(e) = socket.send(Message::Text(json)).await {
                    warn!(connection_id = %connection_id, error = %e, "Failed to push update");
                    break;
                }
            }
        }
    }

    notifier.unregister(&connection_id);
}

/// Reply to `ping` / `request_status`. Unknown or malformed messages are
/// logged and ignored; only send failures are returned.
async fn handle_client_message(
    socket: &mut WebSocket,
    state: &AppState,
    text: &str,
) -> anyhow::Result<()> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Ignoring unrecognized client message");
            return Ok(());
        }
    };

    let reply = match msg {
        ClientMessage::Ping => ServerMessage::pong(),
        ClientMessage::RequestStatus => match state.service.current_status().await {
            Ok(snapshot) => ServerMessage::StatusUpdate(snapshot),
            Err(e) => {
                error!(error = %e, "Failed to get status for client");
                ServerMessage::error(e.to_string())
            }
        },
    };

    send(socket, &reply).await
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(message)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
