//! Engine handle
//!
//! Owns the single inference backend of the process and mediates every
//! access to it. Calls are serialized through one mutex; teardown takes the
//! same mutex, so it never destroys the backend under a running call.
//!
//! State machine: `Uninitialized -> Ready -> ShuttingDown -> Destroyed`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;

use crate::inference::backend::InferenceBackend;
use crate::inference::engine::{EngineError, LlamaEngine, LoadedModelInfo};
use crate::inference::model::{validate_gguf, ModelError};
use crate::inference::streaming::{EngineCallOutcome, TokenAccumulator};
use crate::types::config::EngineConfig;

/// Failure reason reported once the engine is gone
pub const ENGINE_NOT_AVAILABLE: &str = "engine not available";

/// Lifecycle state of the engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Ready = 1,
    ShuttingDown = 2,
    Destroyed = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Uninitialized,
            1 => EngineState::Ready,
            2 => EngineState::ShuttingDown,
            _ => EngineState::Destroyed,
        }
    }
}

/// Fatal errors raised while bringing the engine up
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid model artifact: {0}")]
    Model(#[from] ModelError),

    #[error("Engine initialization failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Engine is already {0:?}")]
    AlreadyInitialized(EngineState),
}

/// Process-wide owner of the inference backend
pub struct EngineManager {
    state: AtomicU8,
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
}

impl EngineManager {
    /// Creates an empty handle in `Uninitialized`
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Uninitialized as u8),
            backend: Mutex::new(None),
        }
    }

    /// Creates a handle that is already `Ready` with the given backend
    pub fn with_backend(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            state: AtomicU8::new(EngineState::Ready as u8),
            backend: Mutex::new(Some(backend)),
        }
    }

    /// Validates the model artifact and loads it with the llama.cpp backend
    ///
    /// Blocks for the duration of the native load. Must be called once,
    /// before any request is served.
    pub fn initialize(&self, config: &EngineConfig) -> Result<LoadedModelInfo, InitError> {
        self.ensure_uninitialized()?;

        let metadata = validate_gguf(&config.model_path)?;
        tracing::debug!(
            "GGUF v{} with {} tensors ({} bytes)",
            metadata.version,
            metadata.tensor_count,
            metadata.file_size
        );

        if let Some(platform) = &config.target_platform {
            tracing::info!("Target platform {} (ignored by llama.cpp)", platform);
        }

        let engine = LlamaEngine::start(config)?;
        let info = engine.model_info().clone();
        self.install(Box::new(engine))?;
        Ok(info)
    }

    /// Moves `backend` into the handle and transitions to `Ready`
    pub fn install(&self, backend: Box<dyn InferenceBackend>) -> Result<(), InitError> {
        let mut slot = self.lock_backend();
        // Re-check under the lock so two installers can't both win
        self.ensure_uninitialized()?;
        tracing::info!("Engine ready ({})", backend.name());
        *slot = Some(backend);
        self.state.store(EngineState::Ready as u8, Ordering::Release);
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runs one prompt through the engine, blocking until it finishes
    ///
    /// Waits for any call already in flight. Fails without touching the
    /// backend unless the handle is `Ready`.
    pub fn call(&self, prompt: &str) -> EngineCallOutcome {
        if self.state() != EngineState::Ready {
            return EngineCallOutcome::Failure(ENGINE_NOT_AVAILABLE.to_string());
        }

        let mut slot = self.lock_backend();

        // Teardown may have started while we waited for the lock
        if self.state() != EngineState::Ready {
            return EngineCallOutcome::Failure(ENGINE_NOT_AVAILABLE.to_string());
        }
        let Some(backend) = slot.as_mut() else {
            return EngineCallOutcome::Failure(ENGINE_NOT_AVAILABLE.to_string());
        };

        let started = Instant::now();
        let mut sink = TokenAccumulator::new();
        let run = backend.run(prompt, &mut sink);
        let outcome = sink.into_outcome(run);

        tracing::debug!(
            "Engine call finished in {:.2}s (success: {})",
            started.elapsed().as_secs_f64(),
            outcome.is_success()
        );
        outcome
    }

    /// Destroys the backend, at most once
    ///
    /// Returns `true` for the caller that performed the teardown and `false`
    /// for every other caller, including calls made before initialization.
    /// Waits for an in-flight call to return first.
    pub fn teardown(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                EngineState::Ready as u8,
                EngineState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            return false;
        }

        let backend = self.lock_backend().take();
        if let Some(backend) = backend {
            tracing::info!("Destroying engine ({})", backend.name());
            drop(backend);
        }

        self.state.store(EngineState::Destroyed as u8, Ordering::Release);
        true
    }

    fn ensure_uninitialized(&self) -> Result<(), InitError> {
        match self.state() {
            EngineState::Uninitialized => Ok(()),
            other => Err(InitError::AlreadyInitialized(other)),
        }
    }

    // A backend that panicked mid-call leaves the lock poisoned; the slot
    // itself is still consistent, so keep serving.
    fn lock_backend(&self) -> MutexGuard<'_, Option<Box<dyn InferenceBackend>>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EngineManager {
    fn default() -> Self {
        Self::new()
    }
}
