//! Shutdown controller
//!
//! Turns SIGINT/SIGTERM into a single engine teardown followed by process
//! exit. tokio delivers signals to an ordinary task, so teardown runs as
//! normal code rather than inside a raw signal handler.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::inference::EngineManager;

/// Termination signals the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    Interrupt,
    Terminate,
}

impl ExitSignal {
    /// Numeric signal value, used as the process exit status
    pub fn code(self) -> i32 {
        match self {
            ExitSignal::Interrupt => 2,
            ExitSignal::Terminate => 15,
        }
    }
}

/// What to do after a signal was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    Exit(i32),
    Ignore,
}

#[derive(Clone)]
pub struct ShutdownController {
    engine: Arc<EngineManager>,
}

impl ShutdownController {
    pub fn new(engine: Arc<EngineManager>) -> Self {
        Self { engine }
    }

    /// Tears the engine down if this is the first signal while it is ready
    ///
    /// Blocks until an in-flight call returns.
    pub fn on_signal(&self, signal: ExitSignal) -> ShutdownAction {
        if self.engine.teardown() {
            tracing::info!("Caught exit signal. Exiting...");
            ShutdownAction::Exit(signal.code())
        } else {
            tracing::debug!("Ignoring {:?}, engine is {:?}", signal, self.engine.state());
            ShutdownAction::Ignore
        }
    }

    /// Spawns the signal listener on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Signal handling failed: {}", e);
            }
        })
    }

    /// Waits for termination signals forever, exiting the process after teardown
    pub async fn run(self) -> io::Result<()> {
        let mut signals = Signals::new()?;
        loop {
            let signal = signals.recv().await;
            let controller = self.clone();
            // Teardown may wait on the engine lock, keep it off the runtime
            let action = tokio::task::spawn_blocking(move || controller.on_signal(signal))
                .await
                .map_err(io::Error::other)?;

            if let ShutdownAction::Exit(code) = action {
                std::process::exit(code);
            }
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> ExitSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ExitSignal::Interrupt,
            _ = self.terminate.recv() => ExitSignal::Terminate,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ExitSignal {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        ExitSignal::Interrupt
    }
}
