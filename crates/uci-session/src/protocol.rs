//! UCI protocol state machine.
//!
//! Serializes search requests to the engine, decodes its output and keeps the
//! stop-before-swap ordering: a new `go` is only sent once the previous search
//! has answered with `bestmove`.

use std::mem;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::search::{parse_uci_move, Eval, Score, Search, SearchEvent};

/// Outbound line channel to the engine worker
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// `uci` sent, waiting for `uciok`/`readyok`
    Handshaking,
    Ready,
}

#[derive(Debug)]
struct ActiveSearch {
    search: Search,
    evaluation: Option<Eval>,
}

#[derive(Debug, Default)]
enum SearchState {
    #[default]
    Idle,
    Searching(ActiveSearch),
    /// `stop` sent; waiting for `bestmove` before the next search may go
    Stopping(ActiveSearch),
    /// Abandoned after a mate-0 report; the engine still owes a `bestmove`
    Draining,
}

/// Fields decoded from an `info` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLine {
    pub depth: u32,
    pub time_ms: Option<u64>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

/// Parse the tokens after `info`. `pv` consumes the rest of the line.
pub fn parse_info(tokens: &[&str]) -> InfoLine {
    let mut info = InfoLine::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|v| v.parse().ok());
            }
            "score" => {
                let is_mate = tokens.get(i + 1) == Some(&"mate");
                let value = tokens.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                i += 2;
                info.score = match (is_mate, value) {
                    // A mate score without a usable distance means mate is on the board
                    (true, v) => Some(Score::Mate(v.unwrap_or(0))),
                    (false, Some(v)) => Some(Score::Cp(v)),
                    (false, None) => None,
                };
            }
            "pv" => {
                info.pv = tokens[i + 1..].iter().map(|m| m.to_string()).collect();
                break;
            }
            _ => {}
        }
        i += 1;
    }

    info
}

/// The UCI adapter. Owns at most one active and one queued search.
#[derive(Debug)]
pub struct Protocol {
    connection: ConnectionState,
    state: SearchState,
    next: Option<Search>,
    send: Option<Outbound>,
    /// Extra options sent after the fixed analysis options
    options: Vec<(String, String)>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    pub fn new() -> Self {
        Self::with_options(Vec::new())
    }

    pub fn with_options(options: Vec<(String, String)>) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            state: SearchState::Idle,
            next: None,
            send: None,
            options,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// True while a search is running or being stopped
    pub fn is_searching(&self) -> bool {
        matches!(
            self.state,
            SearchState::Searching(_) | SearchState::Stopping(_)
        )
    }

    pub fn connect(&mut self, send: Outbound) {
        self.send = Some(send);
        self.connection = ConnectionState::Handshaking;
        self.send_line("uci");
    }

    /// Flush the partial evaluation of the active search, then forget everything.
    pub fn disconnect(&mut self) {
        match mem::take(&mut self.state) {
            SearchState::Searching(active) | SearchState::Stopping(active) => {
                if let Some(eval) = active.evaluation {
                    active.search.emit(SearchEvent::CurrentMove(eval));
                }
            }
            SearchState::Idle | SearchState::Draining => {}
        }

        self.next = None;
        self.send = None;
        self.connection = ConnectionState::Disconnected;
    }

    /// Handle one line of engine output.
    pub fn receive(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((cmd, rest)) = tokens.split_first() else {
            return;
        };

        match *cmd {
            "uciok" => self.on_uciok(),
            "readyok" if self.connection == ConnectionState::Handshaking => {
                self.connection = ConnectionState::Ready;
                self.swap_search();
            }
            "readyok" => debug!(connection = ?self.connection, "ignoring readyok"),
            "bestmove" => self.on_bestmove(),
            "info" => self.on_info(rest),
            _ => debug!(line, "ignoring engine output"),
        }
    }

    /// Queue `next` (replacing any queued search), stop the active one and
    /// start the queue if the engine is free. `None` just clears the queue.
    pub fn perform_search(&mut self, next: Option<Search>) {
        self.next = next;
        self.stop();
        self.swap_search();
    }

    fn on_uciok(&mut self) {
        self.set_option("UCI_AnalyseMode", "true");
        self.set_option("Analysis Contempt", "Off");
        for (name, value) in self.options.clone() {
            self.set_option(&name, &value);
        }

        self.send_line("ucinewgame");
        self.send_line("isready");
    }

    fn on_bestmove(&mut self) {
        match mem::take(&mut self.state) {
            SearchState::Searching(active) | SearchState::Stopping(active) => {
                if let Some(eval) = active.evaluation {
                    active.search.emit(SearchEvent::BestMove(eval));
                }
            }
            SearchState::Draining => debug!("abandoned search finished"),
            SearchState::Idle => debug!("bestmove without an active search"),
        }

        self.swap_search();
    }

    fn on_info(&mut self, rest: &[&str]) {
        let SearchState::Searching(active) = &mut self.state else {
            debug!("info outside an active search");
            return;
        };

        let info = parse_info(rest);
        let Some(score) = info.score else {
            return;
        };

        if score == Score::Mate(0) {
            // The searched side is already mated; don't wait for bestmove
            if let SearchState::Searching(active) = mem::replace(&mut self.state, SearchState::Draining)
            {
                if let Some(eval) = active.evaluation {
                    active.search.emit(SearchEvent::BestMove(eval));
                }
            }
            return;
        }

        let eval = Eval {
            fen: active.search.current_fen.clone(),
            depth: info.depth,
            score: active.search.normalize(score),
            pv: info.pv.iter().filter_map(|m| parse_uci_move(m)).collect(),
        };
        active.evaluation = Some(eval.clone());
        active.search.emit(SearchEvent::CurrentMove(eval));

        let over_budget = matches!(
            (info.time_ms, active.search.search_ms),
            (Some(elapsed), Some(budget)) if elapsed >= budget
        );
        if over_budget {
            self.stop();
        }
    }

    /// Ask the engine to stop the active search; at most once per search.
    fn stop(&mut self) {
        if !matches!(self.state, SearchState::Searching(_)) {
            return;
        }
        if let SearchState::Searching(active) = mem::take(&mut self.state) {
            self.state = SearchState::Stopping(active);
            self.send_line("stop");
        }
    }

    fn swap_search(&mut self) {
        if self.send.is_none()
            || self.connection != ConnectionState::Ready
            || !matches!(self.state, SearchState::Idle)
        {
            return;
        }

        if let Some(search) = self.next.take() {
            self.send_line(&search.position_command());
            self.send_line(&search.go_command());
            self.state = SearchState::Searching(ActiveSearch {
                search,
                evaluation: None,
            });
        }
    }

    fn set_option(&self, name: &str, value: &str) {
        self.send_line(&format!("setoption name {name} value {value}"));
    }

    fn send_line(&self, cmd: &str) {
        debug!(cmd, "engine <");
        if let Some(send) = &self.send {
            if send.send(cmd.to_string()).is_err() {
                warn!(cmd, "engine channel closed");
            }
        }
    }
}
