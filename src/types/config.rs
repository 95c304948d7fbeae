//! Configuration types
//!
//! Engine parameters are fixed at build time and handed to the engine once at
//! startup. Server parameters come from the command line.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Default number of accelerator cores handed to the engine
pub const DEFAULT_NUM_NPU_CORE: u32 = 2;
/// Default sampling top-k (1 = greedy)
pub const DEFAULT_TOP_K: u32 = 1;
/// Default cap on generated tokens per request
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 256;
/// Default context window in tokens
pub const DEFAULT_MAX_CONTEXT_LEN: u32 = 512;

/// Engine configuration, passed once to the engine handle at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the model artifact on disk
    pub model_path: PathBuf,
    /// Number of accelerator cores (worker threads on CPU backends)
    pub num_npu_core: u32,
    /// Maximum number of tokens to generate per call
    pub max_new_tokens: u32,
    /// Maximum context length (prompt + generated tokens)
    pub max_context_len: u32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Target platform identifier, only needed by older model formats
    #[serde(default)]
    pub target_platform: Option<String>,
}

impl EngineConfig {
    /// Builds the default configuration for the model at `model_path`
    pub fn for_model(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    /// Validate configuration values
    ///
    /// Replaces zero values with defaults and keeps the generation budget
    /// inside the context window.
    pub fn validate(&mut self) {
        if self.num_npu_core == 0 {
            tracing::warn!("num_npu_core must be at least 1, using {}", DEFAULT_NUM_NPU_CORE);
            self.num_npu_core = DEFAULT_NUM_NPU_CORE;
        }

        if self.top_k == 0 {
            self.top_k = DEFAULT_TOP_K;
        }

        if self.max_context_len == 0 {
            self.max_context_len = DEFAULT_MAX_CONTEXT_LEN;
        }

        if self.max_new_tokens == 0 {
            self.max_new_tokens = DEFAULT_MAX_NEW_TOKENS;
        }

        // Can't generate more than the context holds
        if self.max_new_tokens > self.max_context_len {
            tracing::warn!(
                "max_new_tokens {} exceeds context length {}, capping to {}",
                self.max_new_tokens,
                self.max_context_len,
                self.max_context_len / 2
            );
            self.max_new_tokens = (self.max_context_len / 2).max(1);
        }

        if let Some(platform) = &self.target_platform {
            if platform.trim().is_empty() {
                self.target_platform = None;
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            num_npu_core: DEFAULT_NUM_NPU_CORE,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            max_context_len: DEFAULT_MAX_CONTEXT_LEN,
            top_k: DEFAULT_TOP_K,
            target_platform: None,
        }
    }
}

/// Command line arguments of the server binary
#[derive(Debug, Clone, Parser)]
#[command(name = "npu-llm-server", version, about = "Serve a local LLM over HTTP")]
pub struct ServerConfig {
    /// Address to bind, e.g. 0.0.0.0
    #[arg(value_name = "IP")]
    pub ip: String,
    /// Port to bind
    #[arg(value_name = "PORT")]
    pub port: u16,
    /// Path to the model artifact
    #[arg(value_name = "MODEL_PATH")]
    pub model_path: PathBuf,
}

impl ServerConfig {
    /// Resolves the bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.ip, self.port).parse()
    }

    /// Engine configuration for the model given on the command line
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::for_model(&self.model_path);
        config.validate();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.num_npu_core, 2);
        assert_eq!(config.top_k, 1);
        assert_eq!(config.max_new_tokens, 256);
        assert_eq!(config.max_context_len, 512);
        assert!(config.target_platform.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::for_model("model.gguf");
        config.num_npu_core = 0;
        config.top_k = 0;
        config.max_new_tokens = 4096;
        config.target_platform = Some("  ".to_string());
        config.validate();

        assert_eq!(config.num_npu_core, 2);
        assert_eq!(config.top_k, 1);
        assert_eq!(config.max_new_tokens, 256);
        assert!(config.target_platform.is_none());

        config.max_context_len = 0;
        config.max_new_tokens = 0;
        config.validate();
        assert_eq!(config.max_context_len, 512);
        assert_eq!(config.max_new_tokens, 256);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = EngineConfig::for_model("/models/qwen.gguf");
        config.target_platform = Some("rk3588".to_string());
        let json = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: EngineConfig = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(deserialized.model_path, config.model_path);
        assert_eq!(deserialized.target_platform.as_deref(), Some("rk3588"));
    }

    #[test]
    fn test_server_args() {
        let args = ServerConfig::try_parse_from(["npu-llm-server", "127.0.0.1", "31337", "m.gguf"])
            .unwrap();
        assert_eq!(args.port, 31337);
        assert_eq!(args.bind_addr().unwrap().to_string(), "127.0.0.1:31337");
        assert_eq!(args.engine_config().model_path, PathBuf::from("m.gguf"));
    }

    #[test]
    fn test_server_args_wrong_arity() {
        assert!(ServerConfig::try_parse_from(["npu-llm-server", "127.0.0.1", "31337"]).is_err());
        assert!(ServerConfig::try_parse_from(["npu-llm-server", "a", "1", "m", "extra"]).is_err());
    }
}
