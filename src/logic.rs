//! Core pipeline shared by the HTTP and WebSocket handlers:
//! validate + build -> resolve credentials -> complete -> normalize -> store.
//!
//! Every failure is terminal for the run and leaves the session's previous
//! result untouched.

use rand::thread_rng;
use tracing::{error, info, instrument, warn};

use crate::builder::build;
use crate::domain::{Category, DifficultyTier};
use crate::errors::PipelineError;
use crate::normalize::normalize;
use crate::secrets::resolve_api_key;
use crate::state::{AppState, LastResult};

/// Raw user selection as received from the controls.
#[derive(Clone, Debug)]
pub struct Selection {
  pub topic: String,
  pub tier: DifficultyTier,
  pub category: Option<Category>,
  pub count: u32,
}

#[instrument(level = "info", skip(state, selection), fields(%session_id, tier = selection.tier.id(), count = selection.count))]
pub async fn run_generation(
  state: &AppState,
  session_id: &str,
  selection: &Selection,
) -> Result<LastResult, PipelineError> {
  let (request, payload) = {
    let mut rng = thread_rng();
    build(
      &selection.topic,
      selection.tier,
      selection.count,
      selection.category,
      &state.config.limits,
      &state.config.prompts,
      &mut rng,
    )
  }
  .map_err(|e| {
    warn!(target: "quiz", error = %e, "Rejected selection");
    e
  })?;

  let api_key = resolve_api_key(state.secrets.as_ref()).map_err(|e| {
    error!(target: "quiz", error = %e, "Credential unavailable; skipping completion call");
    e
  })?;

  let raw = state.client.complete(&api_key, &payload).await?;

  let set = normalize(&raw, payload.shape).map_err(|e| {
    error!(target: "quiz", error = %e, text = %crate::util::preview(&raw.text, 80), "Discarding unparsable completion");
    PipelineError::from(e)
  })?;

  let result = LastResult::new(&request, set);
  state.store_result(session_id, result.clone()).await;
  info!(
    target: "quiz",
    category = request.category().id(),
    records = result.set.records.len(),
    requested = request.count(),
    "Quiz generated"
  );
  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::sync::Arc;

  use crate::config::AppConfig;
  use crate::domain::{OutputShape, RawCompletion};
  use crate::errors::{CompletionFailure, FailureKind, NormalizationFailure};
  use crate::openai::MockCompletionClient;
  use crate::secrets::API_KEY_NAME;

  const KEY: &str = "sk-test-0123456789abcdefghij";

  fn state_with(mock: MockCompletionClient, key: Option<&str>) -> AppState {
    let mut secrets = HashMap::new();
    if let Some(k) = key {
      secrets.insert(API_KEY_NAME.to_string(), k.to_string());
    }
    AppState::new(AppConfig::default(), Arc::new(secrets), Arc::new(mock))
  }

  fn selection(topic: &str, category: Option<Category>) -> Selection {
    Selection { topic: topic.into(), tier: DifficultyTier::Grade2, category, count: 5 }
  }

  #[tokio::test]
  async fn test_missing_credential_never_calls_client() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete().never();
    let state = state_with(mock, None);

    let err = run_generation(&state, "s1", &selection("חלל", None)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(state.last_result("s1").await.is_none());
  }

  #[tokio::test]
  async fn test_invalid_selection_never_calls_client() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete().never();
    let state = state_with(mock, Some(KEY));

    let err = run_generation(&state, "s1", &selection("   ", None)).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
  }

  #[tokio::test]
  async fn test_free_text_run_stores_last_result() {
    let mut mock = MockCompletionClient::new();
    mock.expect_complete()
      .times(1)
      .withf(|key, payload| key.to_string() == KEY && payload.shape == OutputShape::FreeText)
      .returning(|_, _| Ok(RawCompletion { text: "שאלה 1: מה זה ירח?\nשאלה 2: מה זה שמש?".into() }));
    let state = state_with(mock, Some(KEY));

    let result = run_generation(&state, "s1", &selection("  חלל ", None)).await.unwrap();
    assert_eq!(result.topic, "חלל");
    assert_eq!(result.category, Category::GeneralQuiz);
    assert_eq!(result.set.records.len(), 2);
    assert_eq!(state.last_result("s1").await, Some(result));
    assert!(state.last_result("other").await.is_none());
  }

  #[tokio::test]
  async fn test_failures_keep_previous_result() {
    let mut mock = MockCompletionClient::new();
    let mut calls = 0;
    mock.expect_complete().times(3).returning(move |_, _| {
      calls += 1;
      match calls {
        1 => Ok(RawCompletion { text: r#"{"questions": [{"question": "2, 4, ?", "options": ["5", "6", "7", "8"], "correct": "ב"}]}"#.into() }),
        2 => Err(CompletionFailure { kind: FailureKind::RateLimited, message: "rate_limit_exceeded".into() }),
        _ => Ok(RawCompletion { text: "{\"questions\": [".into() }),
      }
    });
    let state = state_with(mock, Some(KEY));
    let sel = selection("מספרים", Some(Category::PatternRecognition));

    let first = run_generation(&state, "s1", &sel).await.unwrap();
    assert_eq!(first.set.records[0].correct_label.as_deref(), Some("ב"));

    let limited = run_generation(&state, "s1", &sel).await.unwrap_err();
    assert!(matches!(limited, PipelineError::Completion(CompletionFailure { kind: FailureKind::RateLimited, .. })));

    let broken = run_generation(&state, "s1", &sel).await.unwrap_err();
    assert!(matches!(broken, PipelineError::Normalization(NormalizationFailure::MalformedJson { .. })));

    assert_eq!(state.last_result("s1").await, Some(first));
  }

  #[tokio::test]
  async fn test_new_run_replaces_slot_wholesale() {
    let mut mock = MockCompletionClient::new();
    let mut calls = 0;
    mock.expect_complete().times(2).returning(move |_, _| {
      calls += 1;
      Ok(RawCompletion { text: format!("שאלה 1: סבב {calls}") })
    });
    let state = state_with(mock, Some(KEY));

    run_generation(&state, "s1", &selection("א", None)).await.unwrap();
    run_generation(&state, "s1", &selection("ב", None)).await.unwrap();

    let last = state.last_result("s1").await.unwrap();
    assert_eq!(last.topic, "ב");
    assert_eq!(last.set.records.len(), 1);
    assert_eq!(last.set.records[0].prompt, "סבב 2");
  }
}
