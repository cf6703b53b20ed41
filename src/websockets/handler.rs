use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::room::RoomService;
use crate::shared::{AppError, AppState};
use crate::websockets::messages::{
    LeaveGamePayload, MessageType, PlaceBidPayload, PlayCardPayload, StartGamePayload,
    SwitchRolePayload, WebSocketMessage,
};

use super::socket::{Connection, MessageHandler, SocketWrapper};

/// Routes parsed client messages into the room service.
pub struct GameReceiveHandler {
    service: Arc<RoomService>,
}

impl GameReceiveHandler {
    pub fn new(service: Arc<RoomService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for GameReceiveHandler {
    async fn handle_message(&self, conn_id: Uuid, room_code: &str, message: String) {
        debug!(
            conn_id = %conn_id,
            room_code = %room_code,
            message = %message,
            "Received message"
        );

        let ws_message = match serde_json::from_str::<WebSocketMessage>(&message) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    conn_id = %conn_id,
                    room_code = %room_code,
                    error = %e,
                    "Failed to parse WebSocket message"
                );
                return;
            }
        };

        match ws_message.message_type {
            MessageType::StartGame => {
                match serde_json::from_value::<StartGamePayload>(ws_message.payload) {
                    Ok(payload) => {
                        self.service
                            .start_game(conn_id, room_code, payload.into())
                            .await;
                    }
                    Err(e) => warn!(conn_id = %conn_id, error = %e, "Bad START_GAME payload"),
                }
            }
            MessageType::PlaceBid => {
                match serde_json::from_value::<PlaceBidPayload>(ws_message.payload) {
                    Ok(payload) => {
                        self.service
                            .place_bid(conn_id, room_code, payload.amount)
                            .await;
                    }
                    Err(e) => warn!(conn_id = %conn_id, error = %e, "Bad PLACE_BID payload"),
                }
            }
            MessageType::PlayCard => {
                match serde_json::from_value::<PlayCardPayload>(ws_message.payload) {
                    Ok(payload) => {
                        self.service
                            .play_card(conn_id, room_code, payload.hand_index, payload.ace_choice)
                            .await;
                    }
                    Err(e) => warn!(conn_id = %conn_id, error = %e, "Bad PLAY_CARD payload"),
                }
            }
            MessageType::TogglePause => {
                self.service.toggle_pause(conn_id, room_code).await;
            }
            MessageType::SwitchRole => {
                match serde_json::from_value::<SwitchRolePayload>(ws_message.payload) {
                    Ok(payload) => {
                        self.service
                            .switch_role(conn_id, room_code, payload.wants_active)
                            .await;
                    }
                    Err(e) => warn!(conn_id = %conn_id, error = %e, "Bad SWITCH_ROLE payload"),
                }
            }
            MessageType::LeaveGame => {
                // An empty payload means "keep watching".
                let payload = serde_json::from_value::<LeaveGamePayload>(ws_message.payload)
                    .unwrap_or(LeaveGamePayload {
                        keep_spectating: true,
                    });
                self.service
                    .leave_game(conn_id, room_code, payload.keep_spectating)
                    .await;
            }
            MessageType::LeaveRoom => {
                self.service.leave_room(conn_id, room_code).await;
            }
            MessageType::VoteRestart => {
                self.service.vote_restart(conn_id, room_code).await;
            }
            other => {
                debug!(message_type = ?other, "Unhandled message type");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub name: String,
}

/// WebSocket endpoint: GET /ws/{room_code}?name={display_name}
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room_code): Path<String>,
    Query(query): Query<JoinQuery>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let name = query.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("A display name is required".to_string()));
    }
    info!(
        room_code = %room_code,
        player = %name,
        "WebSocket connection requested"
    );

    Ok(ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, room_code, name, app_state)
    }))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: axum::extract::ws::WebSocket,
    room_code: String,
    name: String,
    app_state: AppState,
) {
    let conn_id = Uuid::new_v4();
    info!(
        room_code = %room_code,
        player = %name,
        conn_id = %conn_id,
        "WebSocket connection established"
    );

    // Outbound channel (room service -> client), registered before the join
    // so the join's own messages reach the client.
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
    app_state
        .connection_manager
        .add_connection(conn_id, outbound_sender)
        .await;

    let seated = app_state.room_service.join(conn_id, &room_code, &name).await;
    let mut socket_wrapper: Box<dyn SocketWrapper> = Box::new(socket);

    if !seated {
        // Deliver the rejection that join queued, then hang up.
        while let Ok(message) = outbound_receiver.try_recv() {
            let _ = socket_wrapper.send_message(message).await;
        }
        let _ = socket_wrapper.close().await;
        app_state.connection_manager.remove_connection(conn_id).await;
        info!(room_code = %room_code, player = %name, "Join rejected");
        return;
    }

    let message_handler = Arc::new(GameReceiveHandler::new(Arc::clone(&app_state.room_service)));
    let connection = Connection::new(
        conn_id,
        room_code.clone(),
        socket_wrapper,
        outbound_receiver,
        message_handler,
    );

    match connection.run().await {
        Ok(()) => {
            info!(
                room_code = %room_code,
                player = %name,
                "WebSocket connection closed cleanly"
            );
        }
        Err(e) => {
            warn!(
                room_code = %room_code,
                player = %name,
                error = ?e,
                "WebSocket connection error"
            );
        }
    }

    app_state.connection_manager.remove_connection(conn_id).await;
    app_state.room_service.disconnect(conn_id, &room_code).await;
}
