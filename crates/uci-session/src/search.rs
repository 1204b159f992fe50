//! Search requests and the evaluations streamed back for them.

use chess_core::AnalysisPosition;
use serde::{Serialize, Serializer};
use shakmaty::uci::UciMove;
use tokio::sync::mpsc;
use tracing::debug;

/// Engine score. After normalization positive always favors White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

impl Score {
    pub fn value(&self) -> i32 {
        match self {
            Score::Cp(v) | Score::Mate(v) => *v,
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Score::Mate(_))
    }

    /// Flip perspective
    pub fn negate(self) -> Self {
        match self {
            Score::Cp(v) => Score::Cp(-v),
            Score::Mate(v) => Score::Mate(-v),
        }
    }
}

/// One decoded evaluation of the searched position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eval {
    pub fen: String,
    pub depth: u32,
    #[serde(flatten)]
    pub score: Score,
    #[serde(serialize_with = "serialize_pv")]
    pub pv: Vec<UciMove>,
}

fn serialize_pv<S: Serializer>(pv: &[UciMove], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(pv.iter().map(|m| m.to_string()))
}

/// Delivered to the requester of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// Progress update while the engine is thinking
    CurrentMove(Eval),
    /// Final evaluation once the search is over
    BestMove(Eval),
}

/// A single analysis request.
#[derive(Debug, Clone)]
pub struct Search {
    /// Ply of the searched position; odd means Black to move and scores get negated
    pub ply: u32,
    pub start_pos: String,
    pub current_fen: String,
    pub moves: Vec<String>,
    /// Time budget; `None` searches until stopped
    pub search_ms: Option<u64>,
    events: mpsc::UnboundedSender<SearchEvent>,
}

impl Search {
    /// Build a request over `position` along with the receiver for its events.
    pub fn new(
        position: AnalysisPosition,
        search_ms: Option<u64>,
    ) -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_events(position, search_ms, tx), rx)
    }

    /// Build a request reporting to an existing event channel.
    pub fn with_events(
        position: AnalysisPosition,
        search_ms: Option<u64>,
        events: mpsc::UnboundedSender<SearchEvent>,
    ) -> Self {
        Self {
            ply: position.ply,
            start_pos: position.start_fen,
            current_fen: position.current_fen,
            moves: position.moves,
            search_ms: search_ms.filter(|ms| *ms > 0),
            events,
        }
    }

    pub fn position_command(&self) -> String {
        if self.moves.is_empty() {
            format!("position fen {}", self.start_pos)
        } else {
            format!("position fen {} moves {}", self.start_pos, self.moves.join(" "))
        }
    }

    pub fn go_command(&self) -> String {
        match self.search_ms {
            Some(ms) => format!("go movetime {ms}"),
            None => "go infinite".to_string(),
        }
    }

    /// Engines score for the side to move; flip to White's view.
    pub fn normalize(&self, score: Score) -> Score {
        if self.ply % 2 == 1 {
            score.negate()
        } else {
            score
        }
    }

    pub(crate) fn emit(&self, event: SearchEvent) {
        if self.events.send(event).is_err() {
            debug!("search requester went away");
        }
    }
}

/// Parse a 4-5 character move token; anything else is `None`.
pub fn parse_uci_move(token: &str) -> Option<UciMove> {
    if !(4..=5).contains(&token.len()) {
        return None;
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::STANDARD_START_FEN;

    fn position(ply: u32, moves: &[&str]) -> AnalysisPosition {
        AnalysisPosition {
            ply,
            start_fen: STANDARD_START_FEN.to_string(),
            current_fen: STANDARD_START_FEN.to_string(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_commands() {
        let (search, _rx) = Search::new(position(0, &["e2e4", "e7e5"]), Some(1500));
        assert_eq!(
            search.position_command(),
            format!("position fen {STANDARD_START_FEN} moves e2e4 e7e5")
        );
        assert_eq!(search.go_command(), "go movetime 1500");

        let (search, _rx) = Search::new(position(0, &[]), Some(0));
        assert_eq!(search.position_command(), format!("position fen {STANDARD_START_FEN}"));
        assert_eq!(search.go_command(), "go infinite");
    }

    #[test]
    fn test_normalize_by_start_ply() {
        let (white, _rx) = Search::new(position(0, &[]), None);
        let (black, _rx) = Search::new(position(1, &[]), None);
        assert_eq!(white.normalize(Score::Cp(50)), Score::Cp(50));
        assert_eq!(black.normalize(Score::Cp(50)), Score::Cp(-50));
        assert_eq!(black.normalize(Score::Mate(-3)), Score::Mate(3));
    }

    #[test]
    fn test_parse_uci_move() {
        assert_eq!(parse_uci_move("e7e8q").map(|m| m.to_string()), Some("e7e8q".to_string()));
        assert!(parse_uci_move("e2").is_none());
        assert!(parse_uci_move("(none)").is_none());
    }

    #[test]
    fn test_eval_json_shape() {
        let eval = Eval {
            fen: STANDARD_START_FEN.to_string(),
            depth: 12,
            score: Score::Cp(35),
            pv: vec![parse_uci_move("e2e4").unwrap()],
        };
        let json = serde_json::to_value(&eval).unwrap();
        assert_eq!(json["type"], "cp");
        assert_eq!(json["value"], 35);
        assert_eq!(json["pv"][0], "e2e4");
    }
}
