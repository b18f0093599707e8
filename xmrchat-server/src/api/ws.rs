use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use xmrchat_core::events::SuperchatEvent;

use crate::state::AppState;

/// Buffer of events queued for one connection before it is considered
/// slow and events are dropped.
const CONNECTION_EVENT_BUFFER: usize = 32;

/// Subscription control messages sent by the client.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WsClientMessage {
    /// Start receiving superchat events for a video.
    Join { topic: String },
    /// Stop receiving superchat events for a video.
    Leave { topic: String },
}

/// `GET /ws` — WebSocket superchat event stream.
///
/// The client joins and leaves topics (video ids) with JSON control
/// frames; confirmed superchats for joined topics are pushed as JSON
/// text frames. Closing the socket drops every subscription.
pub(super) async fn superchat_ws(
    state: State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_superchat_ws(socket, app_state))
}

/// Background task that drives a single WebSocket connection.
async fn handle_superchat_ws(mut socket: WebSocket, state: AppState) {
    let (event_tx, mut event_rx) = mpsc::channel::<SuperchatEvent>(CONNECTION_EVENT_BUFFER);
    let connection_id = state.broadcaster.register_connection(event_tx).await;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                if send_json(&mut socket, &event).await.is_err() {
                    break;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsClientMessage>(&text) {
                            Ok(WsClientMessage::Join { topic }) => {
                                state.broadcaster.subscribe(connection_id, &topic).await;
                            }
                            Ok(WsClientMessage::Leave { topic }) => {
                                state.broadcaster.unsubscribe(connection_id, &topic).await;
                            }
                            Err(e) => {
                                tracing::debug!(%connection_id, error = %e, "ignoring malformed control frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong and binary frames need no handling.
                    }
                    Some(Err(_)) => {
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.disconnect(connection_id).await;
    let _ = socket.send(Message::Close(None)).await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_and_leave_frames() {
        let join: WsClientMessage =
            serde_json::from_str(r#"{"action":"join","topic":"v1"}"#).unwrap();
        assert_eq!(join, WsClientMessage::Join { topic: "v1".into() });

        let leave: WsClientMessage =
            serde_json::from_str(r#"{"action":"leave","topic":"v1"}"#).unwrap();
        assert_eq!(leave, WsClientMessage::Leave { topic: "v1".into() });
    }

    #[test]
    fn rejects_unknown_actions() {
        assert!(serde_json::from_str::<WsClientMessage>(r#"{"action":"spam","topic":"v1"}"#).is_err());
    }
}
