//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//! Messages on one socket are handled in order, so a socket has at most one
//! generation in flight.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::errors::PipelineError;
use crate::logic::run_generation;
use crate::protocol::{ClientWsMessage, QuizResultOut, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quiz_wizard", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quiz_wizard", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "quiz_wizard", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::from_error(&PipelineError::InvalidRequest(format!("Invalid JSON: {}", e))),
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "kind": "INTERNAL", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "quiz_wizard", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "quiz_wizard", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Generate { body } => {
      let session_id = state.session_id(body.session_id.as_deref());
      match run_generation(state, &session_id, &body.selection()).await {
        Ok(result) => {
          info!(target: "quiz", %session_id, cards = result.set.records.len(), "WS quiz served");
          ServerWsMessage::Quiz { body: QuizResultOut::new(session_id, &result) }
        }
        Err(e) => ServerWsMessage::from_error(&e),
      }
    }

    ClientWsMessage::ShowLast { session_id } => match state.last_result(&session_id).await {
      Some(result) => ServerWsMessage::Quiz { body: QuizResultOut::new(session_id, &result) },
      None => ServerWsMessage::Error {
        kind: "NOT_FOUND".into(),
        message: "📚 עדיין לא נוצר מבחן. בחרו נושא ולחצו על הכפתור!".into(),
      },
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  use crate::config::AppConfig;
  use crate::domain::RawCompletion;
  use crate::openai::MockCompletionClient;
  use crate::secrets::API_KEY_NAME;

  fn state(mock: MockCompletionClient) -> AppState {
    let secrets = HashMap::from([(API_KEY_NAME.to_string(), "sk-test-0123456789abcdefghij".to_string())]);
    AppState::new(AppConfig::default(), Arc::new(secrets), Arc::new(mock))
  }

  #[tokio::test]
  async fn test_generate_then_show_last() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete()
      .times(1)
      .returning(|_, _| Ok(RawCompletion { text: "1. מה צבע העשב?\n2. כמה ימים בשבוע?".into() }));
    let state = state(mock);

    let msg: ClientWsMessage = serde_json::from_str(
      r#"{"type": "generate", "sessionId": "ws-1", "topic": "טבע", "count": 5}"#,
    )
    .unwrap();
    let reply = serde_json::to_value(handle_client_ws(msg, &state).await).unwrap();
    assert_eq!(reply["type"], "quiz");
    assert_eq!(reply["sessionId"], "ws-1");
    assert_eq!(reply["quiz"]["cards"].as_array().map(Vec::len), Some(2));

    let show = ClientWsMessage::ShowLast { session_id: "ws-1".into() };
    let again = serde_json::to_value(handle_client_ws(show, &state).await).unwrap();
    assert_eq!(again["quiz"], reply["quiz"]);
  }

  #[tokio::test]
  async fn test_show_last_without_result_is_error() {
    let state = state(MockCompletionClient::new());
    let reply = serde_json::to_value(
      handle_client_ws(ClientWsMessage::ShowLast { session_id: "none".into() }, &state).await,
    )
    .unwrap();
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["kind"], "NOT_FOUND");
  }
}
