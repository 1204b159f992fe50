//! The authoritative game record and its board projection.
//!
//! `GameState` is the only writer of `start`, `current` and `viewing`. Moves,
//! loads, trims and view navigation all go through its methods.

use shakmaty::{Color, Piece, Rank, Role, Square};
use tracing::{debug, info};

use crate::error::ChessError;
use crate::material::MaterialInfo;
use crate::promotion::{
    PendingPromotion, PromotionCoordinator, PromotionDialog, PromotionOutcome, PromotionTicket,
};
use crate::result::GameResult;
use crate::rules::{Dests, MoveRecord, MoveRequest, RulesAdapter, ShakmatyRules};

/// Where recorded history begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPosition {
    pub fen: String,
    pub ply: u32,
}

/// The live game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentGame {
    pub fen: String,
    pub pgn: String,
    pub ply: u32,
    pub history: Vec<MoveRecord>,
    pub turn_color: Color,
    /// `None` means free analysis: both sides are moved by the user
    pub player_color: Option<Color>,
    pub game_result: Option<GameResult>,
}

/// Annotation drawn on the board (arrow when `dest` is set, circle otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub orig: Square,
    pub dest: Option<Square>,
    pub brush: String,
}

impl Shape {
    pub fn arrow(orig: Square, dest: Square, brush: impl Into<String>) -> Self {
        Self {
            orig,
            dest: Some(dest),
            brush: brush.into(),
        }
    }

    pub fn circle(orig: Square, brush: impl Into<String>) -> Self {
        Self {
            orig,
            dest: None,
            brush: brush.into(),
        }
    }
}

/// Read projection for the board: any ply between `start.ply` and `current.ply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewing {
    pub fen: String,
    pub ply: u32,
    pub turn_color: Color,
    pub legal_moves: Dests,
    pub check: Option<Square>,
    pub auto_shapes: Vec<Shape>,
    pub promotion_dialog: PromotionDialog,
    pub material: MaterialInfo,
    pub orientation: Color,
    pub last_move: Option<(Square, Square)>,
}

/// Inputs for an engine search over the live game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPosition {
    /// Ply of the searched position; engines score for its side to move
    pub ply: u32,
    pub start_fen: String,
    pub current_fen: String,
    /// UCI tokens from `start_fen` to `current_fen`
    pub moves: Vec<String>,
}

/// What happened to a move request.
#[derive(Debug)]
pub enum MoveProgress {
    Committed(MoveRecord),
    /// Parked until the promotion piece is chosen or the choice is canceled.
    AwaitingPromotion(PromotionTicket),
}

#[derive(Debug)]
pub struct GameState<R: RulesAdapter = ShakmatyRules> {
    pub(crate) rules: R,
    pub(crate) start: StartPosition,
    pub(crate) current: CurrentGame,
    pub(crate) viewing: Viewing,
    pub(crate) promotion: PromotionCoordinator,
    /// Bumped on every history change; stale promotions are checked against it
    pub(crate) generation: u64,
}

impl Default for GameState<ShakmatyRules> {
    fn default() -> Self {
        Self::with_rules(ShakmatyRules::new())
    }
}

impl GameState<ShakmatyRules> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        Ok(Self::with_rules(ShakmatyRules::from_fen(fen)?))
    }
}

impl<R: RulesAdapter> GameState<R> {
    pub fn with_rules(rules: R) -> Self {
        let live = rules.describe();
        let mut state = Self {
            start: StartPosition {
                fen: rules.start_fen().to_string(),
                ply: 0,
            },
            current: CurrentGame {
                fen: live.fen.clone(),
                pgn: String::new(),
                ply: 0,
                history: Vec::new(),
                turn_color: live.turn,
                player_color: None,
                game_result: None,
            },
            viewing: Viewing {
                fen: live.fen,
                ply: 0,
                turn_color: live.turn,
                legal_moves: live.legal_moves,
                check: live.check,
                auto_shapes: Vec::new(),
                promotion_dialog: PromotionDialog::Disabled,
                material: live.material,
                orientation: Color::White,
                last_move: None,
            },
            rules,
            promotion: PromotionCoordinator::new(),
            generation: 0,
        };
        state.rebuild();
        state
    }

    pub fn start(&self) -> &StartPosition {
        &self.start
    }

    pub fn current(&self) -> &CurrentGame {
        &self.current
    }

    pub fn viewing(&self) -> &Viewing {
        &self.viewing
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when the board shows a past ply; the projection is read-only then.
    pub fn is_viewing_history(&self) -> bool {
        self.viewing.ply != self.current.ply
    }

    /// Apply a move from the UI.
    ///
    /// While viewing history, free analysis drops the unplayed future first;
    /// with a pinned player color the view snaps back to the live position.
    pub fn play(&mut self, request: MoveRequest) -> Result<MoveProgress, ChessError> {
        if self.is_viewing_history() {
            if self.current.player_color.is_none() {
                self.trim_moves()?;
            } else {
                self.view_current();
            }
        }

        let piece = self.rules.piece_at(request.from);
        if request.promotion.is_none() && needs_promotion(piece, request.to) {
            let reachable = self
                .viewing
                .legal_moves
                .get(&request.from)
                .is_some_and(|dests| dests.contains(&request.to));
            if !reachable {
                return Err(ChessError::IllegalMove(format!("{}{}", request.from, request.to)));
            }

            let ticket = self.promotion.begin(
                self.current.turn_color,
                request.to,
                PendingPromotion {
                    request,
                    generation: self.generation,
                },
            );
            self.sync_dialog();
            return Ok(MoveProgress::AwaitingPromotion(ticket));
        }

        self.commit(request).map(MoveProgress::Committed)
    }

    /// Complete the suspended move. `None` when no choice is pending.
    ///
    /// A pawn or king choice is refused with `IllegalMove` and the dialog
    /// stays open for another pick.
    pub fn promotion_selected(&mut self, role: Role) -> Option<PromotionOutcome> {
        if !self.promotion.is_pending() {
            return None;
        }
        if matches!(role, Role::Pawn | Role::King) {
            debug!(?role, "refusing promotion choice");
            return Some(Err(ChessError::IllegalMove(format!(
                "cannot promote to {role:?}"
            ))));
        }

        let (pending, resolver) = self.promotion.take()?;
        self.sync_dialog();

        let outcome = if pending.generation != self.generation {
            debug!(
                requested = pending.generation,
                current = self.generation,
                "rejecting stale promotion"
            );
            Err(ChessError::PromotionCanceled)
        } else {
            self.commit(pending.request.with_promotion(role))
        };

        resolver.resolve(outcome.clone());
        Some(outcome)
    }

    /// Abandon the suspended move. Returns whether one was pending.
    pub fn promotion_canceled(&mut self) -> bool {
        let canceled = self.promotion.cancel();
        self.sync_dialog();
        canceled
    }

    /// Replace the whole game from PGN.
    pub fn load_pgn(&mut self, pgn: &str) -> Result<(), ChessError> {
        self.promotion_canceled();
        self.rules.load_pgn(pgn)?;
        self.generation += 1;
        self.rebuild();
        info!(ply = self.current.ply, moves = self.current.history.len(), "loaded PGN");
        Ok(())
    }

    /// Replace the whole game with a bare position.
    pub fn set_position(&mut self, fen: &str) -> Result<(), ChessError> {
        self.promotion_canceled();
        self.rules.load_fen(fen)?;
        self.generation += 1;
        self.rebuild();
        info!(ply = self.current.ply, "position set");
        Ok(())
    }

    /// Drop every committed move after the viewed ply. Returns how many were removed.
    pub fn trim_moves(&mut self) -> Result<usize, ChessError> {
        let to_trim = self.current.ply.saturating_sub(self.viewing.ply) as usize;
        if to_trim == 0 {
            return Ok(0);
        }

        self.promotion_canceled();
        for _ in 0..to_trim {
            self.rules.undo()?;
        }
        self.generation += 1;
        self.refresh_current();
        self.view_live();
        debug!(trimmed = to_trim, ply = self.current.ply, "trimmed moves");
        Ok(to_trim)
    }

    pub fn set_player_color(&mut self, color: Option<Color>) {
        self.current.player_color = color;
    }

    pub fn set_auto_shapes(&mut self, shapes: Vec<Shape>) {
        self.viewing.auto_shapes = shapes;
    }

    pub fn toggle_orientation(&mut self) {
        self.viewing.orientation = self.viewing.orientation.other();
    }

    /// Record a result the position can't show (agreement, resignation, flag fall).
    pub fn set_game_result(&mut self, result: GameResult) {
        self.current.game_result = Some(result);
        self.current.pgn = self.rules.pgn(self.current.game_result);
    }

    pub fn analysis_position(&self) -> AnalysisPosition {
        AnalysisPosition {
            ply: self.current.ply,
            start_fen: self.start.fen.clone(),
            current_fen: self.current.fen.clone(),
            moves: self.current.history.iter().map(|m| m.uci.clone()).collect(),
        }
    }

    fn commit(&mut self, request: MoveRequest) -> Result<MoveRecord, ChessError> {
        let record = self.rules.play(&request)?;
        self.promotion_canceled();
        self.generation += 1;
        self.refresh_current();
        self.viewing.auto_shapes.clear();
        self.view_live();

        debug!(san = %record.san, ply = self.current.ply, "move committed");
        if let Some(result) = self.current.game_result {
            info!(%result, "game over");
        }
        Ok(record)
    }

    /// Recompute everything from the rules adapter; the view goes live.
    fn rebuild(&mut self) {
        let history_len = self.rules.history().len() as u32;
        self.start = StartPosition {
            fen: self.rules.start_fen().to_string(),
            ply: self.rules.ply().saturating_sub(history_len),
        };
        self.refresh_current();
        self.viewing.auto_shapes.clear();
        self.view_live();
    }

    fn refresh_current(&mut self) {
        self.current.game_result = GameResult::detect(&self.rules);
        self.current.fen = self.rules.fen();
        self.current.pgn = self.rules.pgn(self.current.game_result);
        self.current.ply = self.rules.ply();
        self.current.history = self.rules.history().to_vec();
        self.current.turn_color = self.rules.turn();
    }

    /// Point the projection at the live position.
    pub(crate) fn view_live(&mut self) {
        let live = self.rules.describe();
        self.viewing.fen = live.fen;
        self.viewing.ply = self.current.ply;
        self.viewing.turn_color = live.turn;
        self.viewing.legal_moves = live.legal_moves;
        self.viewing.check = live.check;
        self.viewing.material = live.material;
        self.viewing.last_move = self.current.history.last().map(|m| (m.from, m.to));
    }

    pub(crate) fn sync_dialog(&mut self) {
        self.viewing.promotion_dialog = self.promotion.dialog();
    }
}

fn needs_promotion(piece: Option<Piece>, to: Square) -> bool {
    match piece {
        Some(Piece {
            role: Role::Pawn,
            color: Color::White,
        }) => to.rank() == Rank::Eighth,
        Some(Piece {
            role: Role::Pawn,
            color: Color::Black,
        }) => to.rank() == Rank::First,
        _ => false,
    }
}
