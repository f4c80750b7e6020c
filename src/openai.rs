//! Minimal OpenAI client for quiz generation.
//!
//! One chat.completions call per pipeline run, plain text or a JSON object
//! depending on the template family. No retries, no streaming, and no
//! client-side timeout: whatever the service reports is surfaced as-is.
//! Calls log model names, latencies and token usage (never contents or keys).

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::OpenAiCfg;
use crate::domain::{OutputShape, PromptPayload, RawCompletion};
use crate::errors::{CompletionFailure, FailureKind};

const AUTH_MARKERS: [&str; 5] = ["api_key", "api key", "authentication", "unauthorized", "401"];
const RATE_MARKERS: [&str; 4] = ["rate_limit", "rate limit", "too many requests", "429"];
const TIMEOUT_MARKERS: [&str; 2] = ["timeout", "timed out"];

/// Best-effort mapping of an upstream error string into a failure kind.
/// Only used to pick the user-facing message.
pub fn classify_failure(message: &str) -> CompletionFailure {
  let lower = message.to_lowercase();
  let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
  let kind = if has(&AUTH_MARKERS) {
    FailureKind::AuthError
  } else if has(&RATE_MARKERS) {
    FailureKind::RateLimited
  } else if has(&TIMEOUT_MARKERS) {
    FailureKind::Timeout
  } else {
    FailureKind::Unknown
  };
  CompletionFailure { kind, message: message.to_string() }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
  async fn complete(&self, api_key: &str, payload: &PromptPayload) -> Result<RawCompletion, CompletionFailure>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  pub fn new(cfg: &OpenAiCfg) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    }
  }

  async fn chat(&self, api_key: &str, payload: &PromptPayload) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: payload.system_instruction.clone() },
        ChatMessageReq { role: "user".into(), content: payload.user_instruction.clone() },
      ],
      temperature: payload.sampling.temperature,
      max_tokens: payload.sampling.max_tokens,
      presence_penalty: payload.sampling.presence_penalty,
      frequency_penalty: payload.sampling.frequency_penalty,
      response_format: match payload.shape {
        OutputShape::StructuredJson => Some(ResponseFormat { r#type: "json_object".into() }),
        OutputShape::FreeText => None,
      },
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "quiz-wizard-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(target: "quiz", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();
    if text.is_empty() {
      return Err("OpenAI returned an empty completion".into());
    }
    Ok(text)
  }
}

#[async_trait]
impl CompletionClient for OpenAI {
  #[instrument(level = "info", skip(self, api_key, payload), fields(model = %self.model, shape = ?payload.shape, style = payload.style, nonce = payload.nonce))]
  async fn complete(&self, api_key: &str, payload: &PromptPayload) -> Result<RawCompletion, CompletionFailure> {
    let start = std::time::Instant::now();
    let result = self.chat(api_key, payload).await;
    let elapsed = start.elapsed();
    match result {
      Ok(text) => {
        info!(target: "quiz", ?elapsed, text_len = text.len(), "Model response received");
        Ok(RawCompletion { text })
      }
      Err(e) => {
        let failure = classify_failure(&e);
        error!(target: "quiz", ?elapsed, kind = ?failure.kind, error = %e, "Model call failed");
        Err(failure)
      }
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  max_tokens: u32,
  presence_penalty: f32,
  frequency_penalty: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Pull `error.message` (and `error.code` when present) out of an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String, #[serde(default)] code: Option<String> }
  let w = serde_json::from_str::<EWrap>(body).ok()?;
  Some(match w.error.code {
    Some(code) => format!("{} ({})", w.error.message, code),
    None => w.error.message,
  })
}
