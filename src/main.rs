//! Quiz Wizard · children's quiz generator backend
//!
//! - Axum HTTP + WebSocket API
//! - OpenAI chat completions for question generation
//! - One in-memory "last quiz" per session
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   OPENAI_API_KEY    : API key (or put it in the secrets file)
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   QUIZ_CONFIG_PATH  : path to TOML config (endpoint, limits, prompts)
//!   QUIZ_SECRETS_PATH : path to a flat TOML secrets file
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod errors;
mod domain;
mod config;
mod secrets;
mod templates;
mod builder;
mod openai;
mod normalize;
mod state;
mod logic;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: config, secret chain, OpenAI client, session slots.
  let state = Arc::new(AppState::from_env());

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quiz_wizard", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "quiz_wizard", error = %e, "Failed to listen for shutdown signal");
  }
  info!(target: "quiz_wizard", "Shutdown signal received");
}
