//! npu-llm-server entry point
//!
//! Usage: `npu-llm-server <IP> <PORT> <MODEL_PATH>`

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use npu_llm_server::inference::EngineManager;
use npu_llm_server::server::{self, Pipeline};
use npu_llm_server::system::logging;
use npu_llm_server::system::shutdown::ShutdownController;
use npu_llm_server::types::config::ServerConfig;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    // Wrong arity exits here with a usage error
    let args = ServerConfig::parse();
    logging::init();

    let engine = Arc::new(EngineManager::new());
    ShutdownController::new(engine.clone()).spawn();

    let config = args.engine_config();
    tracing::info!(
        "Engine init start ({} cores, top_k {}, {} new tokens, {} ctx)",
        config.num_npu_core,
        config.top_k,
        config.max_new_tokens,
        config.max_context_len
    );

    let init = {
        let engine = engine.clone();
        tokio::task::spawn_blocking(move || engine.initialize(&config)).await
    };
    match init {
        Ok(Ok(info)) => tracing::info!(
            "Engine init success! {} ({} bytes)",
            info.path,
            info.size_bytes
        ),
        Ok(Err(e)) => {
            tracing::error!("Engine init failed: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!("Engine init task failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let code = match run_server(&args, engine.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Error in HTTP server: {}", e);
            ExitCode::FAILURE
        }
    };

    let _ = tokio::task::spawn_blocking(move || engine.teardown()).await;
    code
}

async fn run_server(args: &ServerConfig, engine: Arc<EngineManager>) -> std::io::Result<()> {
    let addr = args
        .bind_addr()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Using model from: {}", args.model_path.display());
    tracing::warn!("Do not use in a production deployment.");
    tracing::info!("Listening for HTTP requests on {}...", listener.local_addr()?);

    server::serve(listener, Pipeline::new(engine)).await
}
