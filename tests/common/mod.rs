#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess_core::{GameState, MoveProgress};
use tokio::sync::mpsc::UnboundedReceiver;
use uci_session::{InProcessTransport, SearchEvent, UciBackend};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Answers like a real engine, reporting one fixed `info` line per search
/// and keeping a log of every command it receives.
pub struct ScriptedBackend {
    log: Arc<Mutex<Vec<String>>>,
    info: String,
    owes_bestmove: bool,
}

impl UciBackend for ScriptedBackend {
    fn handle(&mut self, cmd: &str) -> Vec<String> {
        self.log.lock().unwrap().push(cmd.to_string());
        match cmd.split_whitespace().next() {
            Some("uci") => vec!["id name Scripted".into(), "uciok".into()],
            Some("isready") => vec!["readyok".into()],
            Some("go") if cmd.contains("infinite") => {
                self.owes_bestmove = true;
                vec![self.info.clone()]
            }
            Some("go") => vec![self.info.clone(), "bestmove e2e4".into()],
            Some("stop") if self.owes_bestmove => {
                self.owes_bestmove = false;
                vec!["bestmove e2e4".into()]
            }
            _ => Vec::new(),
        }
    }
}

/// A scripted transport plus handles on its command log and open count.
pub struct Scripted {
    pub transport: InProcessTransport<ScriptedBackend>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub opens: Arc<AtomicUsize>,
}

pub fn scripted(info: &str) -> Scripted {
    let log = Arc::new(Mutex::new(Vec::new()));
    let opens = Arc::new(AtomicUsize::new(0));

    let (backend_log, backend_opens, info) = (log.clone(), opens.clone(), info.to_string());
    let transport = InProcessTransport::new(move || {
        backend_opens.fetch_add(1, Ordering::SeqCst);
        ScriptedBackend {
            log: backend_log.clone(),
            info: info.clone(),
            owes_bestmove: false,
        }
    });

    Scripted {
        transport,
        log,
        opens,
    }
}

/// Commands logged so far that start with `prefix`.
pub fn sent(log: &Arc<Mutex<Vec<String>>>, prefix: &str) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|cmd| cmd.starts_with(prefix))
        .cloned()
        .collect()
}

pub async fn next_event(rx: &mut UnboundedReceiver<SearchEvent>) -> SearchEvent {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a search event")
        .expect("event channel closed")
}

pub fn play_all(state: &mut GameState, moves: &[&str]) {
    for m in moves {
        match state.play(m.parse().unwrap()).unwrap() {
            MoveProgress::Committed(_) => {}
            MoveProgress::AwaitingPromotion(_) => panic!("unexpected promotion prompt for {m}"),
        }
    }
}

/// Relations that must hold after every operation.
pub fn assert_invariants(state: &GameState) {
    let (start, current, viewing) = (state.start(), state.current(), state.viewing());
    assert!(start.ply <= viewing.ply && viewing.ply <= current.ply);
    assert_eq!(current.history.len() as u32, current.ply - start.ply);
    if viewing.ply == current.ply {
        assert_eq!(viewing.fen, current.fen);
    }
}
