//! Game results: detected from the position or supplied by the caller.

use std::fmt;

use shakmaty::Color;

use crate::rules::RulesAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinReason {
    Checkmate,
    Resignation,
    TimeForfeit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    ThreefoldRepetition,
    InsufficientMaterial,
    Stalemate,
    /// Never detected here; supplied by the caller
    FiftyMoveRule,
    /// Never detected here; supplied by the caller
    Agreement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win { winner: Color, reason: WinReason },
    Draw(DrawReason),
}

impl GameResult {
    /// Classify the live position. Checkmate wins over the draw reasons,
    /// which are tried in the order repetition, material, stalemate.
    pub fn detect<R: RulesAdapter + ?Sized>(rules: &R) -> Option<Self> {
        if rules.is_checkmate() {
            return Some(GameResult::Win {
                winner: rules.turn().other(),
                reason: WinReason::Checkmate,
            });
        }
        if rules.is_threefold_repetition() {
            return Some(GameResult::Draw(DrawReason::ThreefoldRepetition));
        }
        if rules.is_insufficient_material() {
            return Some(GameResult::Draw(DrawReason::InsufficientMaterial));
        }
        if rules.is_stalemate() {
            return Some(GameResult::Draw(DrawReason::Stalemate));
        }
        None
    }

    /// PGN result token
    pub fn pgn_token(&self) -> &'static str {
        match self {
            GameResult::Win {
                winner: Color::White,
                ..
            } => "1-0",
            GameResult::Win {
                winner: Color::Black,
                ..
            } => "0-1",
            GameResult::Draw(_) => "1/2-1/2",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Win { winner, reason } => {
                let side = if *winner == Color::White { "White" } else { "Black" };
                let how = match reason {
                    WinReason::Checkmate => "checkmate",
                    WinReason::Resignation => "resignation",
                    WinReason::TimeForfeit => "time forfeit",
                };
                write!(f, "{side} wins by {how}")
            }
            GameResult::Draw(reason) => {
                let why = match reason {
                    DrawReason::ThreefoldRepetition => "threefold repetition",
                    DrawReason::InsufficientMaterial => "insufficient material",
                    DrawReason::Stalemate => "stalemate",
                    DrawReason::FiftyMoveRule => "fifty-move rule",
                    DrawReason::Agreement => "agreement",
                };
                write!(f, "Draw by {why}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ShakmatyRules;

    #[test]
    fn test_detect_nothing_at_start() {
        assert_eq!(GameResult::detect(&ShakmatyRules::new()), None);
    }

    #[test]
    fn test_detect_stalemate() {
        let rules = ShakmatyRules::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(
            GameResult::detect(&rules),
            Some(GameResult::Draw(DrawReason::Stalemate))
        );
    }

    #[test]
    fn test_detect_insufficient_material() {
        let rules = ShakmatyRules::from_fen("8/8/4k3/8/8/3NK3/8/8 w - - 0 1").unwrap();
        assert_eq!(
            GameResult::detect(&rules),
            Some(GameResult::Draw(DrawReason::InsufficientMaterial))
        );
    }

    #[test]
    fn test_display_and_token() {
        let result = GameResult::Win {
            winner: Color::Black,
            reason: WinReason::Checkmate,
        };
        assert_eq!(result.to_string(), "Black wins by checkmate");
        assert_eq!(result.pgn_token(), "0-1");
        assert_eq!(GameResult::Draw(DrawReason::Agreement).pgn_token(), "1/2-1/2");
    }
}
