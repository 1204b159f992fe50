//! Engines hosted on a tokio task instead of a child process.

use chess_core::material::MaterialInfo;
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, Position};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::EngineError;
use crate::session::{Transport, Worker, WorkerHandle};

/// A UCI engine living in this process.
pub trait UciBackend: Send + 'static {
    /// Answer one command line. Returned lines are delivered in order.
    fn handle(&mut self, cmd: &str) -> Vec<String>;
}

/// Runs a fresh backend from `make` for every worker.
pub struct InProcessTransport<B> {
    make: Box<dyn Fn() -> B + Send + Sync>,
}

impl<B: UciBackend> InProcessTransport<B> {
    pub fn new(make: impl Fn() -> B + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
        }
    }
}

impl<B: UciBackend> Transport for InProcessTransport<B> {
    fn open(&self) -> Result<Worker, EngineError> {
        let mut backend = (self.make)();
        let (send, mut commands) = mpsc::unbounded_channel::<String>();
        let (out, lines) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(cmd) = commands.recv().await {
                for line in backend.handle(&cmd) {
                    if out.send(line).is_err() {
                        return;
                    }
                }
                if cmd == "quit" {
                    break;
                }
            }
        });

        Ok(Worker {
            send,
            lines,
            handle: WorkerHandle::new(vec![task], None),
        })
    }
}

/// One-ply material engine. Good enough to drive the session without a
/// Stockfish binary.
#[derive(Debug, Default)]
pub struct MaterialBackend {
    position: Chess,
    /// `bestmove` held back until `stop` during `go infinite`
    owed: Option<String>,
}

impl MaterialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_position(&mut self, args: &[&str]) {
        let split = args.iter().position(|t| *t == "moves").unwrap_or(args.len());
        let (setup, moves) = args.split_at(split);

        let position = match setup {
            ["startpos"] => Ok(Chess::default()),
            ["fen", fen @ ..] => fen
                .join(" ")
                .parse::<Fen>()
                .map_err(|e| e.to_string())
                .and_then(|f| {
                    f.into_position(CastlingMode::Standard)
                        .map_err(|e| e.to_string())
                }),
            _ => Err(format!("unsupported position command: {}", args.join(" "))),
        };

        let mut position = match position {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "ignoring position");
                return;
            }
        };

        for token in moves.iter().skip(1) {
            let Some(mv) = token
                .parse::<UciMove>()
                .ok()
                .and_then(|m| m.to_move(&position).ok())
            else {
                debug!(token, "illegal move in position command");
                break;
            };
            position.play_unchecked(mv);
        }

        self.position = position;
    }

    /// `info` line and `bestmove` for the current position.
    fn search(&self) -> (String, String) {
        let turn = self.position.turn();
        let legal = self.position.legal_moves();

        if legal.is_empty() {
            let score = if self.position.is_checkmate() {
                "mate 0"
            } else {
                "cp 0"
            };
            return (
                format!("info depth 0 score {score}"),
                "bestmove (none)".to_string(),
            );
        }

        let mut best: Option<(String, i32, bool)> = None;
        for mv in legal {
            let uci = mv.to_uci(CastlingMode::Standard).to_string();
            let mut after = self.position.clone();
            after.play_unchecked(mv);

            let mates = after.is_checkmate();
            let advantage = MaterialInfo::from_board(after.board()).advantage();
            let points = if turn == Color::White { advantage } else { -advantage };
            let cp = points * 100;

            let better = match &best {
                None => true,
                Some((_, best_cp, best_mates)) => {
                    (mates && !best_mates) || (mates == *best_mates && cp > *best_cp)
                }
            };
            if better {
                best = Some((uci, cp, mates));
            }
        }

        match best {
            Some((uci, _, true)) => (
                format!("info depth 1 time 0 score mate 1 pv {uci}"),
                format!("bestmove {uci}"),
            ),
            Some((uci, cp, false)) => (
                format!("info depth 1 time 0 score cp {cp} pv {uci}"),
                format!("bestmove {uci}"),
            ),
            None => ("info depth 0".to_string(), "bestmove (none)".to_string()),
        }
    }
}

impl UciBackend for MaterialBackend {
    fn handle(&mut self, cmd: &str) -> Vec<String> {
        let tokens: Vec<&str> = cmd.split_whitespace().collect();
        let Some((head, args)) = tokens.split_first() else {
            return Vec::new();
        };

        match *head {
            "uci" => vec![
                "id name Material".to_string(),
                "id author chess-session".to_string(),
                "uciok".to_string(),
            ],
            "isready" => vec!["readyok".to_string()],
            "ucinewgame" => {
                self.position = Chess::default();
                self.owed = None;
                Vec::new()
            }
            "position" => {
                self.set_position(args);
                Vec::new()
            }
            "go" => {
                let (info, bestmove) = self.search();
                let terminal = bestmove == "bestmove (none)";
                if args.contains(&"infinite") && !terminal {
                    self.owed = Some(bestmove);
                    vec![info]
                } else {
                    vec![info, bestmove]
                }
            }
            "stop" => self.owed.take().into_iter().collect(),
            _ => {
                debug!(cmd, "material backend ignoring command");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_lines() {
        let mut backend = MaterialBackend::new();
        assert_eq!(backend.handle("uci").last().map(String::as_str), Some("uciok"));
        assert_eq!(backend.handle("isready"), vec!["readyok"]);
        assert!(backend.handle("setoption name Threads value 1").is_empty());
    }

    #[test]
    fn test_takes_hanging_queen() {
        let mut backend = MaterialBackend::new();
        backend.handle("position startpos moves e2e4 e7e5 d1g4 d7d5 a2a3");
        let lines = backend.handle("go movetime 100");
        assert_eq!(lines, vec!["info depth 1 time 0 score cp 900 pv c8g4", "bestmove c8g4"]);
    }

    #[test]
    fn test_finds_mate_in_one() {
        let mut backend = MaterialBackend::new();
        backend.handle("position startpos moves f2f3 e7e5 g2g4");
        let lines = backend.handle("go movetime 100");
        assert_eq!(lines[0], "info depth 1 time 0 score mate 1 pv d8h4");
        assert_eq!(lines[1], "bestmove d8h4");
    }

    #[test]
    fn test_infinite_waits_for_stop() {
        let mut backend = MaterialBackend::new();
        backend.handle("position startpos");
        let lines = backend.handle("go infinite");
        assert_eq!(lines.len(), 1);
        let stopped = backend.handle("stop");
        assert_eq!(stopped.len(), 1);
        assert!(stopped[0].starts_with("bestmove "));
        assert!(backend.handle("stop").is_empty());
    }

    #[test]
    fn test_mated_position_reports_mate_zero() {
        let mut backend = MaterialBackend::new();
        backend.handle("position startpos moves f2f3 e7e5 g2g4 d8h4");
        let lines = backend.handle("go infinite");
        assert_eq!(lines, vec!["info depth 0 score mate 0", "bestmove (none)"]);
    }
}
