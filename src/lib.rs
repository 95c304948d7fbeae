//! npu-llm-server library
//!
//! Serves a single local LLM over a minimal HTTP interface.

pub mod client;
pub mod inference;
pub mod server;
pub mod system;
pub mod types;
