//! Game state error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    /// Rejected by the rules adapter; the game is unchanged.
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    /// The promotion choice was dismissed; the move was abandoned.
    #[error("Promotion canceled")]
    PromotionCanceled,

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("No move to undo")]
    NothingToUndo,
}
