//! Game state for an interactive chess session: the live game, browsing of
//! past plies, and promotion choices.

pub mod error;
pub mod game_state;
pub mod history;
pub mod material;
pub mod pgn;
pub mod promotion;
pub mod result;
pub mod rules;

pub use error::ChessError;
pub use game_state::{AnalysisPosition, CurrentGame, GameState, MoveProgress, Shape, StartPosition, Viewing};
pub use promotion::{PromotionDialog, PromotionOutcome, PromotionTicket};
pub use result::{DrawReason, GameResult, WinReason};
pub use rules::{Dests, MoveRecord, MoveRequest, RulesAdapter, ShakmatyRules, STANDARD_START_FEN};
