//! Engine lifecycle: owns a worker and pumps its output into the protocol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::protocol::{ConnectionState, Protocol};
use crate::search::Search;

/// What callers hold: start, stop and tear down analysis.
///
/// Must be driven from inside a tokio runtime.
pub trait Engine: Send {
    fn start(&mut self, search: Search);
    fn stop(&mut self);
    fn terminate(&mut self);
}

/// A freshly opened engine worker.
pub struct Worker {
    pub send: mpsc::UnboundedSender<String>,
    pub lines: mpsc::UnboundedReceiver<String>,
    pub handle: WorkerHandle,
}

/// Resources backing a worker; released on terminate.
#[derive(Default)]
pub struct WorkerHandle {
    tasks: Vec<JoinHandle<()>>,
    child: Option<Child>,
}

impl WorkerHandle {
    pub fn new(tasks: Vec<JoinHandle<()>>, child: Option<Child>) -> Self {
        Self { tasks, child }
    }

    pub fn release(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "engine process already gone");
            }
        }
    }
}

/// Starts engine workers that exchange UCI text lines.
pub trait Transport: Send + Sync + 'static {
    fn open(&self) -> Result<Worker, EngineError>;
}

struct RunningWorker {
    generation: u64,
    pump: JoinHandle<()>,
    handle: WorkerHandle,
}

/// An [`Engine`] over any [`Transport`].
pub struct EngineSession<T: Transport> {
    transport: T,
    protocol: Arc<Mutex<Protocol>>,
    worker: Option<RunningWorker>,
    generation: Arc<AtomicU64>,
}

fn lock(protocol: &Mutex<Protocol>) -> MutexGuard<'_, Protocol> {
    protocol.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> EngineSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_protocol(transport, Protocol::new())
    }

    /// Use a preconfigured protocol, e.g. one carrying extra engine options.
    pub fn with_protocol(transport: T, protocol: Protocol) -> Self {
        Self {
            transport,
            protocol: Arc::new(Mutex::new(protocol)),
            worker: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// True while a worker is attached and its output is still flowing
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.pump.is_finished())
    }

    pub fn connection(&self) -> ConnectionState {
        lock(&self.protocol).connection()
    }

    fn ensure_worker(&mut self) {
        if self.is_running() {
            return;
        }
        if let Some(dead) = self.worker.take() {
            warn!(generation = dead.generation, "engine worker exited, restarting");
            dead.handle.release();
        }

        let Worker {
            send,
            mut lines,
            handle,
        } = match self.transport.open() {
            Ok(worker) => worker,
            Err(e) => {
                error!(error = %e, "failed to open engine worker");
                return;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.protocol).connect(send);

        let protocol = Arc::clone(&self.protocol);
        let current = Arc::clone(&self.generation);
        let pump = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                let mut protocol = lock(&protocol);
                if current.load(Ordering::SeqCst) != generation {
                    debug!(generation, "dropping output of stale worker");
                    return;
                }
                debug!(line = line.as_str(), "engine >");
                protocol.receive(&line);
            }

            let mut protocol = lock(&protocol);
            if current.load(Ordering::SeqCst) == generation {
                error!(generation, "engine output closed");
                protocol.disconnect();
            }
        });

        info!(generation, "engine worker started");
        self.worker = Some(RunningWorker {
            generation,
            pump,
            handle,
        });
    }
}

impl<T: Transport> Engine for EngineSession<T> {
    fn start(&mut self, search: Search) {
        lock(&self.protocol).perform_search(Some(search));
        self.ensure_worker();
    }

    fn stop(&mut self) {
        lock(&self.protocol).perform_search(None);
    }

    fn terminate(&mut self) {
        let worker = self.worker.take();
        {
            // The pump checks the generation under this lock, so no line of
            // the old worker reaches the protocol after the disconnect.
            let mut protocol = lock(&self.protocol);
            if worker.is_some() {
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            protocol.disconnect();
        }
        if let Some(worker) = worker {
            worker.pump.abort();
            worker.handle.release();
            info!(generation = worker.generation, "engine worker terminated");
        }
    }
}

impl<T: Transport> Drop for EngineSession<T> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Holds the active engine, if any.
#[derive(Default)]
pub struct EngineHost {
    engine: Option<Box<dyn Engine>>,
}

impl EngineHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.engine.is_some()
    }

    /// Install `engine`, terminating the previous one first.
    pub fn swap(&mut self, engine: Option<Box<dyn Engine>>) {
        if let Some(mut previous) = self.engine.take() {
            previous.terminate();
        }
        self.engine = engine;
    }

    /// Start a search; dropped with a warning when no engine is attached.
    pub fn start(&mut self, search: Search) {
        match self.engine.as_mut() {
            Some(engine) => engine.start(search),
            None => warn!("no engine attached, search ignored"),
        }
    }

    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        self.swap(None);
    }
}
