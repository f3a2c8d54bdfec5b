//! Devforces · Contest Judge Backend
//!
//! - Axum HTTP API for problems, contests, registrations and submissions
//! - Submission evaluation: local code execution + AI judge + score blending
//! - Background contest status updater
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   JUDGE_API_KEY         : required for evaluating submissions
//!   JUDGE_BASE_URL        : default "https://openrouter.ai/api/v1"
//!   JUDGE_MODELS          : comma-separated model identifiers, tried in order
//!   JUDGE_TIMEOUT_SECS    : per-request timeout for the AI judge
//!   EXECUTION_TIMEOUT_MS  : per-test-case wall-clock limit
//!   JUDGE_FAILURE_POLICY  : "fail" (default) or "degrade"
//!   DEVFORCES_CONFIG_PATH : path to TOML config (settings, prompts, problem/contest bank)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod config;
mod contest_status;
mod domain;
mod error;
mod evaluator;
mod executor;
mod judge;
mod protocol;
mod routes;
mod scoring;
mod seeds;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::AppConfig;
use crate::contest_status::{spawn_status_updater, REFRESH_EVERY};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (stores, executor, AI judge client).
  let state = Arc::new(AppState::new(AppConfig::load()).await);

  spawn_status_updater(state.store.clone(), REFRESH_EVERY);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "devforces", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "devforces", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
