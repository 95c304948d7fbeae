//! Request pipeline
//!
//! Turns one request body into one response. Single-shot: no retries.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;

use crate::inference::{EngineCallOutcome, EngineManager};
use crate::types::request::{ContentResponse, PromptRequest};

/// Body returned when the engine call fails
pub const LLM_ERROR_MESSAGE: &str = "Error running LLM.";
/// Body returned by the liveness probe
pub const ONLINE_MESSAGE: &str = "online";

/// Shared request handler around the engine handle
#[derive(Clone)]
pub struct Pipeline {
    engine: Arc<EngineManager>,
}

impl Pipeline {
    pub fn new(engine: Arc<EngineManager>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<EngineManager> {
        &self.engine
    }

    /// Handles one `POST /` body, blocking for the engine call
    pub fn handle(&self, body: &[u8]) -> (StatusCode, ContentResponse) {
        let request = match PromptRequest::from_body(body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejecting request: {}", e);
                return (StatusCode::BAD_REQUEST, ContentResponse::new(e.to_string()));
            }
        };

        match self.engine.call(&request.prompt()) {
            EngineCallOutcome::Success(text) => (StatusCode::OK, ContentResponse::new(text)),
            EngineCallOutcome::Failure(reason) => {
                tracing::error!("Error running LLM: {}", reason);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ContentResponse::new(LLM_ERROR_MESSAGE),
                )
            }
        }
    }

    /// Runs [`Pipeline::handle`] on the blocking pool
    pub async fn handle_async(
        &self,
        remote: Option<SocketAddr>,
        body: Bytes,
    ) -> (StatusCode, ContentResponse) {
        match remote {
            Some(addr) => tracing::info!("{} - {}", addr, String::from_utf8_lossy(&body)),
            None => tracing::info!("{}", String::from_utf8_lossy(&body)),
        }

        let pipeline = self.clone();
        match tokio::task::spawn_blocking(move || pipeline.handle(&body)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Engine task failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ContentResponse::new(LLM_ERROR_MESSAGE),
                )
            }
        }
    }

    /// Liveness probe; never touches the engine
    pub fn liveness() -> (StatusCode, ContentResponse) {
        (StatusCode::OK, ContentResponse::new(ONLINE_MESSAGE))
    }
}
