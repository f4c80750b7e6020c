//! Pipeline error taxonomy and its HTTP mapping.

use axum::{
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;

/// Advisory classification of an upstream failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  AuthError,
  RateLimited,
  Timeout,
  Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct CompletionFailure {
  pub kind: FailureKind,
  pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NormalizationFailure {
  #[error("malformed JSON: {detail}")]
  MalformedJson { detail: String },

  #[error("schema violation: {detail}")]
  SchemaViolation { detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PipelineError {
  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("Completion failed: {0}")]
  Completion(#[from] CompletionFailure),

  #[error("Normalization failed: {0}")]
  Normalization(#[from] NormalizationFailure),
}

impl PipelineError {
  pub fn kind(&self) -> &'static str {
    match self {
      PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
      PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
      PipelineError::Completion(f) => match f.kind {
        FailureKind::AuthError => "AUTH_ERROR",
        FailureKind::RateLimited => "RATE_LIMITED",
        FailureKind::Timeout => "TIMEOUT",
        FailureKind::Unknown => "COMPLETION_ERROR",
      },
      PipelineError::Normalization(NormalizationFailure::MalformedJson { .. }) => "MALFORMED_JSON",
      PipelineError::Normalization(NormalizationFailure::SchemaViolation { .. }) => "SCHEMA_VIOLATION",
    }
  }

  /// Message shown to the child/parent in the UI.
  pub fn user_message(&self) -> String {
    match self {
      PipelineError::InvalidRequest(detail) if detail.starts_with("topic") =>
        "⚠️ אופס! שכחתם לכתוב נושא. בבקשה כתבו על מה תרצו ללמוד!".into(),
      PipelineError::InvalidRequest(_) =>
        "⚠️ מספר השאלות שנבחר אינו בטווח המותר.".into(),
      PipelineError::Configuration(_) =>
        "🔑 מפתח ה-API לא נמצא! יש להוסיף OPENAI_API_KEY בהגדרות הסודות.".into(),
      PipelineError::Completion(f) => match f.kind {
        FailureKind::AuthError => "🔑 בעיה עם מפתח ה-API. אנא בדוק שהמפתח תקין.".into(),
        FailureKind::RateLimited => "⏳ יותר מדי בקשות! אנא המתן מעט ונסה שוב.".into(),
        FailureKind::Timeout => "⌛ הבקשה לקחה יותר מדי זמן. אנא נסה שוב.".into(),
        FailureKind::Unknown => format!("❌ שגיאה ביצירת השאלות: {}", f.message),
      },
      PipelineError::Normalization(_) =>
        "❌ התשובה שהתקבלה לא הייתה במבנה הצפוי. נסו ליצור את המבחן שוב.".into(),
    }
  }

  fn status_code(&self) -> StatusCode {
    match self {
      PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      PipelineError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
      PipelineError::Completion(f) => match f.kind {
        FailureKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::AuthError | FailureKind::Unknown => StatusCode::BAD_GATEWAY,
      },
      PipelineError::Normalization(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

/// Malformed request bodies and query strings get the same JSON envelope as
/// pipeline errors.
impl From<JsonRejection> for PipelineError {
  fn from(err: JsonRejection) -> Self {
    PipelineError::InvalidRequest(err.body_text())
  }
}

impl From<QueryRejection> for PipelineError {
  fn from(err: QueryRejection) -> Self {
    PipelineError::InvalidRequest(err.body_text())
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  pub kind: &'static str,
  pub message: String,
}

impl IntoResponse for PipelineError {
  fn into_response(self) -> Response {
    let body = ErrorResponse { error: self.to_string(), kind: self.kind(), message: self.user_message() };
    (self.status_code(), Json(body)).into_response()
  }
}
