//! UCI engine sessions: the protocol adapter, engine workers and their
//! lifecycle.

pub mod config;
pub mod error;
pub mod in_process;
pub mod protocol;
pub mod search;
pub mod session;
pub mod stockfish;

pub use config::SessionConfig;
pub use error::EngineError;
pub use in_process::{InProcessTransport, MaterialBackend, UciBackend};
pub use protocol::{ConnectionState, Protocol};
pub use search::{Eval, Score, Search, SearchEvent};
pub use session::{Engine, EngineHost, EngineSession, Transport, Worker, WorkerHandle};
pub use stockfish::StockfishTransport;
