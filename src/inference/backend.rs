//! Backend trait
//!
//! Narrow call/callback contract between the engine handle and a native engine.

use crate::inference::engine::EngineError;
use crate::inference::streaming::TokenAccumulator;

/// A loaded inference engine that can run one prompt at a time
///
/// `run` blocks until generation ends, pushing every fragment into `sink`.
/// An `Err` return corresponds to a non-zero return code from the native
/// call. Implementations are not required to be reentrant; the engine handle
/// never calls `run` concurrently. Dropping the backend releases the native
/// resources.
pub trait InferenceBackend: Send {
    fn run(&mut self, prompt: &str, sink: &mut TokenAccumulator) -> Result<(), EngineError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "backend"
    }
}
