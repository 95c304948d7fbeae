//! HTTP server
//!
//! Request pipeline plus the thin axum layer that feeds it.

pub mod pipeline;
pub mod routes;

pub use pipeline::{Pipeline, LLM_ERROR_MESSAGE, ONLINE_MESSAGE};
pub use routes::{router, serve};
