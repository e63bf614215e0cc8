//! WebSocket channel for booth clients.
//!
//! Clients send `{"event": "createSession"}` or
//! `{"event": "endSession", "data": "<sessionId>"}`; replies go back to the
//! same connection only.

use crate::api::AppState;
use crate::models::Session;
use crate::session_service::SessionService;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events accepted from a client
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    CreateSession,
    EndSession(String),
}

/// Events pushed to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    SessionCreated(Session),
    SessionEnded {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    fn error(message: &str) -> Self {
        ServerEvent::Error {
            message: message.to_string(),
        }
    }
}

/// Run one client event against the session service
pub async fn dispatch(sessions: &SessionService, event: ClientEvent) -> ServerEvent {
    match event {
        ClientEvent::CreateSession => match sessions.create().await {
            Ok(session) => ServerEvent::SessionCreated(session),
            Err(e) => {
                error!(error = %e, "Realtime session create failed");
                ServerEvent::error("Failed to create session")
            }
        },
        ClientEvent::EndSession(session_id) => match sessions.end(&session_id).await {
            Ok(session) => ServerEvent::SessionEnded {
                session_id: session.session_id,
            },
            Err(e) => {
                warn!(error = %e, session_id = %session_id, "Realtime session end failed");
                ServerEvent::error("Failed to end session")
            }
        },
    }
}

async fn handle_text(sessions: &SessionService, text: &str) -> ServerEvent {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => {
            debug!(event = ?event, "Realtime event received");
            dispatch(sessions, event).await
        }
        Err(e) => {
            debug!(error = %e, "Unrecognized realtime message");
            ServerEvent::error("Unrecognized event")
        }
    }
}

/// Upgrade handler for `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.sessions))
}

async fn handle_socket(mut socket: WebSocket, sessions: Arc<SessionService>) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "Client connected");
    metrics::gauge!("booth.realtime.connections").increment(1.0);

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        let reply = match message {
            Message::Text(text) => handle_text(&sessions, &text).await,
            Message::Close(_) => break,
            // Ping/pong are answered by the transport; binary frames are ignored
            _ => continue,
        };

        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize realtime event");
                continue;
            }
        };

        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    metrics::gauge!("booth.realtime.connections").decrement(1.0);
    info!(connection_id = %connection_id, "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use crate::test_support::InMemoryStore;

    fn service(store: &Arc<InMemoryStore>) -> SessionService {
        SessionService::new(store.clone(), store.clone(), chrono::Duration::hours(24))
    }

    #[test]
    fn test_parse_client_events() {
        assert_eq!(
            serde_json::from_str::<ClientEvent>(r#"{"event":"createSession"}"#).unwrap(),
            ClientEvent::CreateSession
        );
        assert_eq!(
            serde_json::from_str::<ClientEvent>(r#"{"event":"endSession","data":"a1b2"}"#)
                .unwrap(),
            ClientEvent::EndSession("a1b2".to_string())
        );
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"takePhoto"}"#).is_err());
    }

    #[test]
    fn test_server_event_shape() {
        let ended = serde_json::to_value(ServerEvent::SessionEnded {
            session_id: "a1b2".to_string(),
        })
        .unwrap();
        assert_eq!(
            ended,
            serde_json::json!({"event": "sessionEnded", "data": {"sessionId": "a1b2"}})
        );

        let error = serde_json::to_value(ServerEvent::error("Failed to end session")).unwrap();
        assert_eq!(error["event"], "error");
        assert_eq!(error["data"]["message"], "Failed to end session");
    }

    #[tokio::test]
    async fn test_create_then_end_over_channel() {
        let store = Arc::new(InMemoryStore::default());
        let sessions = service(&store);

        let session = match handle_text(&sessions, r#"{"event":"createSession"}"#).await {
            ServerEvent::SessionCreated(session) => session,
            other => panic!("Expected sessionCreated, got {:?}", other),
        };
        assert_eq!(session.status, SessionStatus::Active);

        let request = format!(r#"{{"event":"endSession","data":"{}"}}"#, session.session_id);
        match handle_text(&sessions, &request).await {
            ServerEvent::SessionEnded { session_id } => assert_eq!(session_id, session.session_id),
            other => panic!("Expected sessionEnded, got {:?}", other),
        }

        let stored = store.session(&session.session_id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_end_unknown_session_emits_error() {
        let store = Arc::new(InMemoryStore::default());
        let reply = dispatch(&service(&store), ClientEvent::EndSession("missing".into())).await;

        match reply {
            ServerEvent::Error { message } => assert_eq!(message, "Failed to end session"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_message_emits_error() {
        let store = Arc::new(InMemoryStore::default());
        match handle_text(&service(&store), "not json").await {
            ServerEvent::Error { message } => assert_eq!(message, "Unrecognized event"),
            other => panic!("Expected error, got {:?}", other),
        }
    }
}
