//! Rules adapter: the seam between game state and the chess rules library.
//!
//! `GameState` only talks to the `RulesAdapter` trait. `ShakmatyRules` is the
//! shipped implementation backed by shakmaty.

use std::collections::BTreeMap;
use std::str::FromStr;

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Piece, Position, Role, Square};

use crate::error::ChessError;
use crate::material::MaterialInfo;
use crate::pgn;
use crate::result::GameResult;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Legal destinations keyed by origin square. Castling is keyed by the king's
/// destination square.
pub type Dests = BTreeMap<Square, Vec<Square>>;

/// Convert a turn color and full-move number into an absolute ply.
pub fn game_ply(turn: Color, move_number: u32) -> u32 {
    2 * move_number.saturating_sub(1) + u32::from(turn == Color::Black)
}

/// A move as requested by the UI: origin, destination, optional promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl MoveRequest {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }
}

impl FromStr for MoveRequest {
    type Err = ChessError;

    /// Parse a 4-5 character UCI token (`e2e4`, `e7e8q`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<UciMove>() {
            Ok(UciMove::Normal {
                from,
                to,
                promotion,
            }) => Ok(Self {
                from,
                to,
                promotion,
            }),
            _ => Err(ChessError::IllegalMove(format!("unparsable move '{s}'"))),
        }
    }
}

/// A committed move with the positions around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub color: Color,
    pub from: Square,
    pub to: Square,
    pub role: Role,
    pub promotion: Option<Role>,
    pub capture: Option<Role>,
    /// SAN including `+`/`#` suffix
    pub san: String,
    pub uci: String,
    /// FEN before the move
    pub before: String,
    /// FEN after the move
    pub after: String,
}

/// Everything the board projection needs about one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionInfo {
    pub fen: String,
    pub turn: Color,
    pub legal_moves: Dests,
    /// Square of the side-to-move king when in check
    pub check: Option<Square>,
    pub material: MaterialInfo,
}

/// The rules engine contract consumed by `GameState`.
pub trait RulesAdapter {
    /// Reset to a bare position with empty history.
    fn load_fen(&mut self, fen: &str) -> Result<(), ChessError>;

    /// Replace the whole game. Must leave `self` untouched on error.
    fn load_pgn(&mut self, pgn: &str) -> Result<(), ChessError>;

    fn play(&mut self, request: &MoveRequest) -> Result<MoveRecord, ChessError>;

    fn undo(&mut self) -> Result<MoveRecord, ChessError>;

    fn fen(&self) -> String;

    /// PGN of the game so far, terminated by `result` when the game is over.
    fn pgn(&self, result: Option<GameResult>) -> String;

    fn start_fen(&self) -> &str;

    fn history(&self) -> &[MoveRecord];

    fn piece_at(&self, square: Square) -> Option<Piece>;

    fn turn(&self) -> Color;

    fn move_number(&self) -> u32;

    fn is_check(&self) -> bool;

    fn is_checkmate(&self) -> bool;

    fn is_stalemate(&self) -> bool;

    fn is_insufficient_material(&self) -> bool;

    fn is_threefold_repetition(&self) -> bool;

    /// Describe the live position.
    fn describe(&self) -> PositionInfo;

    /// Describe a detached position without touching the game.
    fn inspect(&self, fen: &str) -> Result<PositionInfo, ChessError>;

    /// Absolute ply of the live position.
    fn ply(&self) -> u32 {
        game_ply(self.turn(), self.move_number())
    }
}

/// `RulesAdapter` backed by shakmaty with an undo stack.
#[derive(Debug, Clone)]
pub struct ShakmatyRules {
    start_fen: String,
    headers: Vec<(String, String)>,
    /// positions[0] is the start; the last one is live
    positions: Vec<Chess>,
    /// Repetition key for each entry of `positions`
    keys: Vec<String>,
    history: Vec<MoveRecord>,
}

impl Default for ShakmatyRules {
    fn default() -> Self {
        Self::from_position(Chess::default(), Vec::new())
    }
}

impl ShakmatyRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        Ok(Self::from_position(parse_fen(fen)?, Vec::new()))
    }

    fn from_position(start: Chess, headers: Vec<(String, String)>) -> Self {
        let start_fen = fen_of(&start);
        Self {
            keys: vec![repetition_key(&start_fen)],
            start_fen,
            headers,
            positions: vec![start],
            history: Vec::new(),
        }
    }

    fn position(&self) -> &Chess {
        // positions is never empty
        &self.positions[self.positions.len() - 1]
    }

    fn push(&mut self, mv: shakmaty::Move) -> MoveRecord {
        let before_pos = self.position().clone();
        let before = fen_of(&before_pos);
        let san = San::from_move(&before_pos, mv.clone()).to_string();
        let uci = mv.to_uci(CastlingMode::Standard);

        let mut after_pos = before_pos.clone();
        after_pos.play_unchecked(mv.clone());
        let suffix = if after_pos.is_checkmate() {
            "#"
        } else if after_pos.is_check() {
            "+"
        } else {
            ""
        };
        let after = fen_of(&after_pos);

        let (from, to) = match uci {
            UciMove::Normal { from, to, .. } => (from, to),
            _ => (mv.from().unwrap_or(mv.to()), mv.to()),
        };

        let record = MoveRecord {
            color: before_pos.turn(),
            from,
            to,
            role: mv.role(),
            promotion: mv.promotion(),
            capture: mv.capture(),
            san: format!("{san}{suffix}"),
            uci: uci.to_string(),
            before,
            after: after.clone(),
        };

        self.keys.push(repetition_key(&after));
        self.positions.push(after_pos);
        self.history.push(record.clone());
        record
    }
}

impl RulesAdapter for ShakmatyRules {
    fn load_fen(&mut self, fen: &str) -> Result<(), ChessError> {
        *self = Self::from_fen(fen)?;
        Ok(())
    }

    fn load_pgn(&mut self, pgn_text: &str) -> Result<(), ChessError> {
        let game = pgn::parse_pgn(pgn_text);
        let start = match game.start_fen() {
            Some(fen) => parse_fen(fen)?,
            None => Chess::default(),
        };

        let mut rules = Self::from_position(start, game.headers.clone());
        for token in &game.moves {
            let san: SanPlus = token
                .parse()
                .map_err(|_| ChessError::InvalidPgn(format!("unreadable move '{token}'")))?;
            let mv = san
                .san
                .to_move(rules.position())
                .map_err(|_| ChessError::InvalidPgn(format!("illegal move '{token}'")))?;
            rules.push(mv);
        }

        *self = rules;
        Ok(())
    }

    fn play(&mut self, request: &MoveRequest) -> Result<MoveRecord, ChessError> {
        let uci = UciMove::Normal {
            from: request.from,
            to: request.to,
            promotion: request.promotion,
        };
        let mv = uci
            .to_move(self.position())
            .map_err(|_| ChessError::IllegalMove(uci.to_string()))?;
        Ok(self.push(mv))
    }

    fn undo(&mut self) -> Result<MoveRecord, ChessError> {
        let record = self.history.pop().ok_or(ChessError::NothingToUndo)?;
        self.positions.pop();
        self.keys.pop();
        Ok(record)
    }

    fn fen(&self) -> String {
        fen_of(self.position())
    }

    fn pgn(&self, result: Option<GameResult>) -> String {
        let start_ply = game_ply(
            self.positions[0].turn(),
            self.positions[0].fullmoves().get(),
        );
        let sans: Vec<String> = self.history.iter().map(|m| m.san.clone()).collect();
        pgn::write_pgn(
            &self.headers,
            &self.start_fen,
            start_ply,
            &sans,
            result.as_ref().map(GameResult::pgn_token),
        )
    }

    fn start_fen(&self) -> &str {
        &self.start_fen
    }

    fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position().board().piece_at(square)
    }

    fn turn(&self) -> Color {
        self.position().turn()
    }

    fn move_number(&self) -> u32 {
        self.position().fullmoves().get()
    }

    fn is_check(&self) -> bool {
        self.position().is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.position().is_checkmate()
    }

    fn is_stalemate(&self) -> bool {
        self.position().is_stalemate()
    }

    fn is_insufficient_material(&self) -> bool {
        self.position().is_insufficient_material()
    }

    fn is_threefold_repetition(&self) -> bool {
        let current = &self.keys[self.keys.len() - 1];
        self.keys.iter().filter(|key| *key == current).count() >= 3
    }

    fn describe(&self) -> PositionInfo {
        describe_position(self.position())
    }

    fn inspect(&self, fen: &str) -> Result<PositionInfo, ChessError> {
        Ok(describe_position(&parse_fen(fen)?))
    }
}

fn parse_fen(fen: &str) -> Result<Chess, ChessError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| ChessError::InvalidFen(format!("{fen}: {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| ChessError::InvalidFen(format!("{fen}: {e}")))
}

fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Board, side to move, castling rights and en passant square.
fn repetition_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

fn describe_position(pos: &Chess) -> PositionInfo {
    let mut legal_moves = Dests::new();
    for mv in pos.legal_moves() {
        if let UciMove::Normal { from, to, .. } = mv.to_uci(CastlingMode::Standard) {
            let dests = legal_moves.entry(from).or_default();
            if !dests.contains(&to) {
                dests.push(to);
            }
        }
    }

    let check = if pos.is_check() {
        pos.board().king_of(pos.turn())
    } else {
        None
    };

    PositionInfo {
        fen: fen_of(pos),
        turn: pos.turn(),
        legal_moves,
        check,
        material: MaterialInfo::from_board(pos.board()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(s: &str) -> MoveRequest {
        s.parse().unwrap()
    }

    #[test]
    fn test_game_ply() {
        assert_eq!(game_ply(Color::White, 1), 0);
        assert_eq!(game_ply(Color::Black, 1), 1);
        assert_eq!(game_ply(Color::White, 2), 2);
        assert_eq!(game_ply(Color::Black, 5), 9);
    }

    #[test]
    fn test_move_request_parse() {
        let m = req("e7e8q");
        assert_eq!(m.from, Square::E7);
        assert_eq!(m.to, Square::E8);
        assert_eq!(m.promotion, Some(Role::Queen));
        assert!("e2".parse::<MoveRequest>().is_err());
    }

    #[test]
    fn test_play_records_san_and_fens() {
        let mut rules = ShakmatyRules::new();
        let record = rules.play(&req("e2e4")).unwrap();
        assert_eq!(record.san, "e4");
        assert_eq!(record.uci, "e2e4");
        assert_eq!(record.color, Color::White);
        assert_eq!(record.before, STANDARD_START_FEN);
        assert_eq!(record.after, rules.fen());
        assert_eq!(rules.ply(), 1);
        assert_eq!(rules.turn(), Color::Black);
    }

    #[test]
    fn test_illegal_move_leaves_position() {
        let mut rules = ShakmatyRules::new();
        let err = rules.play(&req("e2e5")).unwrap_err();
        assert!(matches!(err, ChessError::IllegalMove(_)));
        assert_eq!(rules.fen(), STANDARD_START_FEN);
        assert!(rules.history().is_empty());
    }

    #[test]
    fn test_castling_uses_king_destination() {
        let mut rules =
            ShakmatyRules::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let info = rules.describe();
        assert!(info.legal_moves[&Square::E1].contains(&Square::G1));
        assert!(info.legal_moves[&Square::E1].contains(&Square::C1));

        let record = rules.play(&req("e1g1")).unwrap();
        assert_eq!(record.san, "O-O");
        assert_eq!(record.uci, "e1g1");
    }

    #[test]
    fn test_undo_restores_previous_position() {
        let mut rules = ShakmatyRules::new();
        rules.play(&req("e2e4")).unwrap();
        rules.play(&req("e7e5")).unwrap();
        let undone = rules.undo().unwrap();
        assert_eq!(undone.san, "e5");
        assert_eq!(rules.fen(), undone.before);
        assert_eq!(rules.history().len(), 1);

        rules.undo().unwrap();
        assert_eq!(rules.undo().unwrap_err(), ChessError::NothingToUndo);
    }

    #[test]
    fn test_checkmate_detection_and_suffix() {
        let mut rules = ShakmatyRules::new();
        for m in ["f2f3", "e7e5", "g2g4"] {
            rules.play(&req(m)).unwrap();
        }
        let mate = rules.play(&req("d8h4")).unwrap();
        assert_eq!(mate.san, "Qh4#");
        assert!(rules.is_checkmate());
        assert_eq!(rules.describe().check, Some(Square::E1));
    }

    #[test]
    fn test_threefold_repetition() {
        let mut rules = ShakmatyRules::new();
        for m in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1"] {
            rules.play(&req(m)).unwrap();
            assert!(!rules.is_threefold_repetition());
        }
        rules.play(&req("f6g8")).unwrap();
        assert!(rules.is_threefold_repetition());
    }

    #[test]
    fn test_load_pgn_is_all_or_nothing() {
        let mut rules = ShakmatyRules::new();
        rules.play(&req("d2d4")).unwrap();

        let err = rules.load_pgn("1. e4 e5 2. Ke3").unwrap_err();
        assert!(matches!(err, ChessError::InvalidPgn(_)));
        assert_eq!(rules.history().len(), 1);
        assert_eq!(rules.history()[0].san, "d4");

        rules.load_pgn("1. e4 e5 2. Nf3").unwrap();
        assert_eq!(rules.history().len(), 3);
        assert_eq!(rules.pgn(None), "1. e4 e5 2. Nf3");
    }

    #[test]
    fn test_load_pgn_with_fen_header() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 7";
        let mut rules = ShakmatyRules::new();
        rules
            .load_pgn(&format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n7... Kd7 8. e4"))
            .unwrap();
        assert_eq!(rules.start_fen(), fen);
        assert_eq!(rules.ply(), 15);
        assert!(rules.pgn(None).ends_with("7... Kd7 8. e4"));
    }

    #[test]
    fn test_inspect_detached_position() {
        let rules = ShakmatyRules::new();
        let info = rules
            .inspect("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();
        assert_eq!(info.check, Some(Square::E1));
        assert!(info.legal_moves.is_empty());
        assert_eq!(rules.fen(), STANDARD_START_FEN);
        assert!(rules.inspect("not a fen").is_err());
    }
}
