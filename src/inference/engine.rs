//! Inference engine implementation
//!
//! llama.cpp backend for the engine handle.
//!
//! # Architecture
//!
//! Since llama-cpp-2 types (`LlamaBackend`, `LlamaModel`, `LlamaContext`) contain
//! raw pointers that are not `Send`, the native backend and model live on a
//! dedicated worker thread for their whole life. [`LlamaEngine`] only holds the
//! command channel, so it can be owned by the engine handle and moved between
//! request threads. Dropping it shuts the worker down, which frees the model.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use thiserror::Error;

use crate::inference::backend::InferenceBackend;
use crate::inference::streaming::{StreamToken, TokenAccumulator};
use crate::types::config::EngineConfig;

/// Errors that can occur during inference operations
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("Failed to initialize backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to create context: {0}")]
    ContextCreate(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Worker thread error: {0}")]
    WorkerError(String),
}

/// Generation parameters for inference
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Top-k sampling parameter (1 = greedy)
    pub top_k: u32,
    /// Context window size
    pub max_context_size: u32,
    /// Threads used for decoding
    pub threads: u32,
}

impl From<&EngineConfig> for GenerationParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_tokens: config.max_new_tokens,
            top_k: config.top_k,
            max_context_size: config.max_context_len,
            threads: config.num_npu_core,
        }
    }
}

/// Model information after loading
#[derive(Debug, Clone)]
pub struct LoadedModelInfo {
    /// Path to the loaded model
    pub path: String,
    /// Vocabulary size
    pub vocab_size: i32,
    /// Training context length
    pub context_length: u32,
    /// Total parameter count
    pub param_count: u64,
    /// Model size in bytes
    pub size_bytes: u64,
}

/// Commands sent to the worker thread
enum WorkerCommand {
    Generate {
        prompt: String,
        token_tx: Sender<StreamToken>,
    },
    Shutdown,
}

/// llama.cpp inference engine
///
/// Uses a dedicated worker thread for all llama-cpp operations since
/// the underlying types are not Send.
pub struct LlamaEngine {
    /// Channel to send commands to the worker thread
    command_tx: Option<Sender<WorkerCommand>>,
    /// Handle to the worker thread
    worker_handle: Option<JoinHandle<()>>,
    model_info: LoadedModelInfo,
}

impl LlamaEngine {
    /// Starts the worker thread, initializes the backend and loads the model
    ///
    /// Blocks until the model is loaded or loading failed. On failure the
    /// worker has already exited and nothing native is left alive.
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let path = config.model_path.clone();
        let params = GenerationParams::from(config);

        let handle = thread::Builder::new()
            .name("llm-worker".to_string())
            .spawn(move || worker_thread_main(path, params, ready_tx, command_rx))
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        let model_info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(e) => {
                let _ = handle.join();
                return Err(EngineError::WorkerError(e.to_string()));
            }
        };

        tracing::info!("LlamaEngine worker thread started");
        Ok(Self {
            command_tx: Some(command_tx),
            worker_handle: Some(handle),
            model_info,
        })
    }

    /// Returns information about the loaded model
    pub fn model_info(&self) -> &LoadedModelInfo {
        &self.model_info
    }
}

impl InferenceBackend for LlamaEngine {
    fn run(&mut self, prompt: &str, sink: &mut TokenAccumulator) -> Result<(), EngineError> {
        let command_tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| EngineError::WorkerError("worker already shut down".to_string()))?;

        let (token_tx, token_rx) = mpsc::channel();
        command_tx
            .send(WorkerCommand::Generate {
                prompt: prompt.to_string(),
                token_tx,
            })
            .map_err(|e| EngineError::WorkerError(e.to_string()))?;

        // The worker always ends a generation with Done or Error
        for token in token_rx.iter() {
            let terminal = matches!(token, StreamToken::Done | StreamToken::Error(_));
            sink.push(token);
            if terminal {
                return Ok(());
            }
        }

        Err(EngineError::WorkerError(
            "worker exited during generation".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "llama.cpp"
    }
}

impl Drop for LlamaEngine {
    fn drop(&mut self) {
        // Send shutdown command
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WorkerCommand::Shutdown);
        }
        // Wait for worker thread to finish
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
        tracing::info!("LlamaEngine destroyed");
    }
}

/// Worker thread main loop
///
/// Owns the LlamaBackend and LlamaModel, processes commands until shutdown.
fn worker_thread_main(
    path: PathBuf,
    params: GenerationParams,
    ready_tx: Sender<Result<LoadedModelInfo, EngineError>>,
    command_rx: Receiver<WorkerCommand>,
) {
    let backend = match LlamaBackend::init() {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to init backend: {}", e);
            let _ = ready_tx.send(Err(EngineError::BackendInit(e.to_string())));
            return;
        }
    };

    let model = match load_model(&backend, &path) {
        Ok(m) => m,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let info = LoadedModelInfo {
        path: path.to_string_lossy().to_string(),
        vocab_size: model.n_vocab(),
        context_length: model.n_ctx_train(),
        param_count: model.n_params() as u64,
        size_bytes: model.size() as u64,
    };
    tracing::info!(
        "Model loaded: {} ({} params, {} vocab, {} ctx)",
        info.path,
        info.param_count,
        info.vocab_size,
        info.context_length
    );

    if ready_tx.send(Ok(info)).is_err() {
        return;
    }

    loop {
        match command_rx.recv() {
            Ok(WorkerCommand::Generate { prompt, token_tx }) => {
                match run_generation(&backend, &model, &prompt, &params, &token_tx) {
                    Ok(()) => {
                        let _ = token_tx.send(StreamToken::Done);
                    }
                    Err(e) => {
                        let _ = token_tx.send(StreamToken::Error(e));
                    }
                }
            }
            Ok(WorkerCommand::Shutdown) => {
                tracing::info!("Worker thread shutting down");
                break;
            }
            Err(_) => {
                // Channel closed, exit
                tracing::debug!("Command channel closed, worker exiting");
                break;
            }
        }
    }
}

fn load_model(backend: &LlamaBackend, path: &Path) -> Result<LlamaModel, EngineError> {
    // CPU only; accelerator offload is chosen at build time via features
    let model_params = LlamaModelParams::default();
    LlamaModel::load_from_file(backend, path, &model_params)
        .map_err(|e| EngineError::ModelLoad(e.to_string()))
}

/// Run text generation (called from worker thread)
fn run_generation(
    backend: &LlamaBackend,
    model: &LlamaModel,
    prompt: &str,
    params: &GenerationParams,
    tx: &Sender<StreamToken>,
) -> Result<(), String> {
    let n_ctx = params.max_context_size.min(model.n_ctx_train()).max(1);
    let n_ctx_nz = NonZeroU32::new(n_ctx).ok_or("context size must be non-zero")?;
    let threads = i32::try_from(params.threads).unwrap_or(i32::MAX);

    // A fresh context per call keeps the KV cache from leaking between requests
    let ctx_params = LlamaContextParams::default()
        .with_n_ctx(Some(n_ctx_nz))
        .with_n_batch(n_ctx)
        .with_n_threads(threads)
        .with_n_threads_batch(threads);

    let mut ctx = model
        .new_context(backend, ctx_params)
        .map_err(|e| format!("Failed to create context: {}", e))?;

    let tokens = model
        .str_to_token(prompt, AddBos::Always)
        .map_err(|e| format!("Failed to tokenize: {}", e))?;

    tracing::debug!("Tokenized prompt into {} tokens", tokens.len());

    if tokens.is_empty() {
        return Err("Prompt produced no tokens".to_string());
    }
    if tokens.len() >= n_ctx as usize {
        return Err(format!(
            "Prompt of {} tokens does not fit context of {}",
            tokens.len(),
            n_ctx
        ));
    }

    run_inference(&mut ctx, model, tokens, n_ctx, params, tx)
}

/// Runs the inference loop
fn run_inference(
    ctx: &mut LlamaContext,
    model: &LlamaModel,
    prompt_tokens: Vec<LlamaToken>,
    n_ctx: u32,
    params: &GenerationParams,
    tx: &Sender<StreamToken>,
) -> Result<(), String> {
    let mut batch = LlamaBatch::new(n_ctx as usize, 1);

    let last = prompt_tokens.len() - 1;
    for (i, token) in prompt_tokens.iter().enumerate() {
        batch
            .add(*token, i as i32, &[0], i == last)
            .map_err(|e| format!("Failed to add token to batch: {}", e))?;
    }

    ctx.decode(&mut batch)
        .map_err(|e| format!("Failed to decode prompt: {}", e))?;

    let mut sampler = if params.top_k <= 1 {
        LlamaSampler::greedy()
    } else {
        LlamaSampler::chain_simple([
            LlamaSampler::top_k(params.top_k as i32),
            LlamaSampler::dist(rand_seed()),
        ])
    };

    let mut n_decoded = prompt_tokens.len() as i32;
    let mut utf8_buffer: Vec<u8> = Vec::new();

    for _ in 0..params.max_tokens {
        if n_decoded >= n_ctx as i32 {
            tracing::debug!("Context window full after {} tokens", n_decoded);
            break;
        }

        let new_token = sampler.sample(ctx, batch.n_tokens() - 1);
        sampler.accept(new_token);

        if model.is_eog_token(new_token) {
            tracing::debug!("End of generation token encountered");
            break;
        }

        let token_bytes = model
            .token_to_bytes(new_token, Special::Tokenize)
            .map_err(|e| format!("Failed to convert token to bytes: {}", e))?;
        utf8_buffer.extend_from_slice(&token_bytes);

        if let Some(text) = drain_utf8(&mut utf8_buffer) {
            if tx.send(StreamToken::Token(text)).is_err() {
                tracing::debug!("Receiver dropped, stopping generation");
                return Ok(());
            }
        }

        batch.clear();
        batch
            .add(new_token, n_decoded, &[0], true)
            .map_err(|e| format!("Failed to add token to batch: {}", e))?;
        ctx.decode(&mut batch)
            .map_err(|e| format!("Failed to decode: {}", e))?;

        n_decoded += 1;
    }

    // Flush whatever is left; an incomplete trailing sequence is replaced
    if !utf8_buffer.is_empty() {
        let rest = String::from_utf8_lossy(&utf8_buffer).into_owned();
        let _ = tx.send(StreamToken::Token(rest));
    }

    Ok(())
}

/// Takes the longest valid UTF-8 prefix out of `buffer`
///
/// Tokens can split multi-byte characters, so an incomplete suffix stays in
/// the buffer until the next token completes it. Bytes that can never become
/// valid are replaced with U+FFFD.
fn drain_utf8(buffer: &mut Vec<u8>) -> Option<String> {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(buffer) {
            Ok(s) => {
                out.push_str(s);
                buffer.clear();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                // valid_up_to guarantees this prefix is UTF-8
                out.push_str(&String::from_utf8_lossy(&buffer[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        buffer.drain(..valid + bad);
                    }
                    None => {
                        buffer.drain(..valid);
                        break;
                    }
                }
            }
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Generates a random seed using system entropy
fn rand_seed() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_params_from_config() {
        let params = GenerationParams::from(&EngineConfig::default());
        assert_eq!(params.max_tokens, 256);
        assert_eq!(params.top_k, 1);
        assert_eq!(params.max_context_size, 512);
        assert_eq!(params.threads, 2);
    }

    #[test]
    fn test_drain_utf8_complete() {
        let mut buf = "héllo".as_bytes().to_vec();
        assert_eq!(drain_utf8(&mut buf).as_deref(), Some("héllo"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_utf8_keeps_incomplete_suffix() {
        let bytes = "aé".as_bytes();
        let mut buf = bytes[..2].to_vec();
        assert_eq!(drain_utf8(&mut buf).as_deref(), Some("a"));
        assert_eq!(buf, vec![bytes[1]]);

        buf.push(bytes[2]);
        assert_eq!(drain_utf8(&mut buf).as_deref(), Some("é"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_utf8_only_incomplete() {
        let mut buf = vec![0xE2, 0x82];
        assert_eq!(drain_utf8(&mut buf), None);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_drain_utf8_invalid_byte_replaced() {
        let mut buf = vec![b'a', 0xFF, b'b'];
        assert_eq!(drain_utf8(&mut buf).as_deref(), Some("a\u{FFFD}b"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_start_with_missing_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_model(dir.path().join("absent.gguf"));
        assert!(LlamaEngine::start(&config).is_err());
    }
}
