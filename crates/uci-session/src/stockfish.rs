//! Stockfish (or any UCI binary) as a child process (async I/O)

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::EngineError;
use crate::session::{Transport, Worker, WorkerHandle};

/// Spawns a fresh engine process per worker.
#[derive(Debug, Clone)]
pub struct StockfishTransport {
    path: String,
}

impl StockfishTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for StockfishTransport {
    fn open(&self) -> Result<Worker, EngineError> {
        let mut process = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {e}", self.path)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("engine stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("engine stdout unavailable".into()))?;

        let (send, commands) = mpsc::unbounded_channel();
        let (out, lines) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_commands(stdin, commands));
        let reader = tokio::spawn(async move {
            let mut stdout = BufReader::new(stdout).lines();
            loop {
                match stdout.next_line().await {
                    Ok(Some(line)) => {
                        if out.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let e = EngineError::Communication(format!("failed to read from engine: {e}"));
                        error!(error = %e, "engine read failed");
                        break;
                    }
                }
            }
        });

        Ok(Worker {
            send,
            lines,
            handle: WorkerHandle::new(vec![writer, reader], Some(process)),
        })
    }
}

async fn write_commands(mut stdin: ChildStdin, mut commands: mpsc::UnboundedReceiver<String>) {
    while let Some(cmd) = commands.recv().await {
        if let Err(e) = send(&mut stdin, &cmd).await {
            error!(error = %e, cmd, "engine write failed");
            break;
        }
    }
}

/// Send a command line to the engine
async fn send(stdin: &mut ChildStdin, cmd: &str) -> Result<(), EngineError> {
    debug!(cmd, "SF <");
    stdin
        .write_all(format!("{cmd}\n").as_bytes())
        .await
        .map_err(|e| EngineError::Communication(format!("Failed to write to engine: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| EngineError::Communication(format!("Failed to flush stdin: {e}")))?;
    Ok(())
}
