//! System utilities
//!
//! Process-level concerns: logging setup and signal-driven shutdown.

pub mod logging;
pub mod shutdown;
