//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{FromRequest, FromRequestParts, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::errors::{ErrorResponse, PipelineError};
use crate::logic::run_generation;
use crate::protocol::*;
use crate::state::AppState;

/// `Json` whose rejection is a `PipelineError`, so bad bodies get the JSON
/// error envelope instead of axum's plain-text 4xx.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(PipelineError))]
pub struct AppJson<T>(pub T);

/// `Query` counterpart of `AppJson`.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(PipelineError))]
pub struct AppQuery<T>(pub T);

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(catalog(&state.config.limits))
}

#[instrument(level = "info", skip(state, body), fields(tier = body.tier.id(), count = body.count, topic_len = body.topic.len()))]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  AppJson(body): AppJson<GenerateIn>,
) -> Result<Json<QuizResultOut>, PipelineError> {
  let session_id = state.session_id(body.session_id.as_deref());
  let result = run_generation(&state, &session_id, &body.selection()).await?;
  info!(target: "quiz", %session_id, cards = result.set.records.len(), "HTTP quiz served");
  Ok(Json(QuizResultOut::new(session_id, &result)))
}

#[instrument(level = "info", skip(state), fields(session_id = %q.session_id))]
pub async fn http_get_last_quiz(
  State(state): State<Arc<AppState>>,
  AppQuery(q): AppQuery<LastQuery>,
) -> Response {
  match state.last_result(&q.session_id).await {
    Some(result) => Json(QuizResultOut::new(q.session_id, &result)).into_response(),
    None => (
      StatusCode::NOT_FOUND,
      Json(ErrorResponse {
        error: format!("No quiz stored for session {}", q.session_id),
        kind: "NOT_FOUND",
        message: "📚 עדיין לא נוצר מבחן. בחרו נושא ולחצו על הכפתור!".into(),
      }),
    )
      .into_response(),
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use axum::body::{to_bytes, Body};
  use axum::http::{Request, StatusCode};
  use serde_json::Value;
  use tower::ServiceExt;

  use crate::config::AppConfig;
  use crate::domain::RawCompletion;
  use crate::openai::MockCompletionClient;
  use crate::routes::build_router;
  use crate::secrets::API_KEY_NAME;
  use crate::state::AppState;

  use super::*;

  fn app(mock: MockCompletionClient, with_key: bool) -> (axum::Router, Arc<AppState>) {
    let mut secrets = HashMap::new();
    if with_key {
      secrets.insert(API_KEY_NAME.to_string(), "sk-test-0123456789abcdefghij".to_string());
    }
    let state = Arc::new(AppState::new(AppConfig::default(), Arc::new(secrets), Arc::new(mock)));
    (build_router(state.clone()), state)
  }

  async fn send(router: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = router.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  fn post_quiz(body: &str) -> Request<Body> {
    Request::post("/api/v1/quiz")
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  #[tokio::test]
  async fn test_post_quiz_returns_cards_and_session() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete().times(1).returning(|_, _| {
      Ok(RawCompletion { text: r#"```json
{"passage": "הדג שוחה בים.", "questions": [{"question": "איפה הדג?", "options": ["בים", "בשמיים", "בבית", "ביער"], "correct": "א", "explanation": "כתוב בקטע"}]}
```"#.into() })
    });
    let (router, state) = app(mock, true);

    let (status, v) = send(
      router,
      post_quiz(r#"{"sessionId": "abc", "topic": "ים", "tier": "grade3", "category": "reading_comprehension", "count": 3}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["sessionId"], "abc");
    assert_eq!(v["quiz"]["passage"], "הדג שוחה בים.");
    assert_eq!(v["quiz"]["cards"][0]["options"][0]["label"], "א");
    assert_eq!(v["quiz"]["cards"][0]["reveal"]["hints"]["explanation"], "כתוב בקטע");
    assert!(state.last_result("abc").await.is_some());
  }

  #[tokio::test]
  async fn test_post_quiz_without_key_is_service_unavailable() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete().never();
    let (router, _) = app(mock, false);

    let (status, v) = send(router, post_quiz(r#"{"topic": "ים", "count": 5}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["kind"], "CONFIGURATION_ERROR");
  }

  #[tokio::test]
  async fn test_post_quiz_with_empty_topic_is_bad_request() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete().never();
    let (router, _) = app(mock, true);

    let (status, v) = send(router, post_quiz(r#"{"topic": "  ", "count": 5}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["kind"], "INVALID_REQUEST");
    assert!(v["message"].as_str().unwrap().contains("שכחתם"));
  }

  #[tokio::test]
  async fn test_post_quiz_with_undecodable_body_is_bad_request_envelope() {
    let bodies = [
      r#"{"topic": "ים", "count": -1}"#,
      r#"{"topic": "ים", "count": 99999999999}"#,
      r#"{"topic": "ים", "tier": "grade9", "count": 5}"#,
      r#"{"topic": "ים""#,
    ];
    for body in bodies {
      let mut mock = MockCompletionClient::new();
      mock.expect_complete().never();
      let (router, _) = app(mock, true);

      let (status, v) = send(router, post_quiz(body)).await;
      assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
      assert_eq!(v["kind"], "INVALID_REQUEST", "{body}");
      assert!(v["message"].is_string(), "{body}");
      assert!(v["error"].as_str().unwrap().starts_with("Invalid request"), "{body}");
    }
  }

  #[tokio::test]
  async fn test_post_quiz_without_json_content_type_is_bad_request_envelope() {
    let (router, _) = app(MockCompletionClient::new(), true);
    let req = Request::post("/api/v1/quiz").body(Body::from(r#"{"topic": "ים", "count": 5}"#)).unwrap();
    let (status, v) = send(router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["kind"], "INVALID_REQUEST");
  }

  #[tokio::test]
  async fn test_last_quiz_without_session_param_is_bad_request_envelope() {
    let (router, _) = app(MockCompletionClient::new(), true);
    let req = Request::get("/api/v1/quiz/last").body(Body::empty()).unwrap();
    let (status, v) = send(router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["kind"], "INVALID_REQUEST");
  }

  #[tokio::test]
  async fn test_last_quiz_unknown_session_is_not_found() {
    let (router, _) = app(MockCompletionClient::new(), true);
    let req = Request::get("/api/v1/quiz/last?sessionId=nope").body(Body::empty()).unwrap();
    let (status, v) = send(router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["kind"], "NOT_FOUND");
  }

  #[tokio::test]
  async fn test_catalog_exposes_bounds() {
    let (router, _) = app(MockCompletionClient::new(), true);
    let req = Request::get("/api/v1/catalog").body(Body::empty()).unwrap();
    let (status, v) = send(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["minCount"], 3);
    assert_eq!(v["maxCount"], 10);
    assert_eq!(v["categories"][0]["shape"], "free_text");
  }
}
