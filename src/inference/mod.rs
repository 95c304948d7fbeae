//! LLM inference engine
//!
//! This module owns the process-wide engine handle and the llama-cpp backend behind it.

pub mod backend;
pub mod engine;
pub mod handle;
pub mod model;
pub mod streaming;

// Re-export main types for convenience
pub use backend::InferenceBackend;
pub use engine::{EngineError, GenerationParams, LlamaEngine, LoadedModelInfo};
pub use handle::{EngineManager, EngineState, InitError, ENGINE_NOT_AVAILABLE};
pub use model::{validate_gguf, GgufMetadata, ModelError, GGUF_MAGIC};
pub use streaming::{AccumulatorState, EngineCallOutcome, StreamToken, TokenAccumulator};
