//! Interactive client for npu-llm-server
//!
//! Reads a line, sends it wrapped in the chat template, prints the answer.

use std::process::ExitCode;

use clap::Parser;
use npu_llm_server::client::PromptClient;
use npu_llm_server::system::logging;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "ask", about = "Chat with a running npu-llm-server")]
struct Args {
    /// Server URL
    #[arg(long, default_value = "http://192.168.0.196:31337")]
    url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init();

    let client = PromptClient::new(args.url);
    println!("Type anything then press enter. Type exit or quit to do so.");

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        if stdout.write_all(b"ai> ").await.is_err() || stdout.flush().await.is_err() {
            return ExitCode::FAILURE;
        }

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                return ExitCode::FAILURE;
            }
        };

        if matches!(line.trim().to_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        match client.ask(&line).await {
            Ok(answer) => println!("{}", answer),
            Err(e) => tracing::error!("{}", e),
        }
    }

    println!("Goodbye!");
    ExitCode::SUCCESS
}
