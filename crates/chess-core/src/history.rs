//! Ply-indexed browsing over committed history.
//!
//! Navigation only rewrites the `viewing` projection; `current`, the rules
//! adapter and any engine state are never touched.

use tracing::warn;

use crate::game_state::GameState;
use crate::rules::{MoveRecord, RulesAdapter};

/// What a ply resolves to within the recorded history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTarget<'a> {
    /// The live position
    Live,
    /// The position before `history[index]` was played
    Historical { index: usize, record: &'a MoveRecord },
}

/// Resolve `ply` against a history starting at `start_ply`; `None` when out of range.
pub fn project(start_ply: u32, history: &[MoveRecord], ply: u32) -> Option<ViewTarget<'_>> {
    let index = ply.checked_sub(start_ply)? as usize;
    match index.cmp(&history.len()) {
        std::cmp::Ordering::Equal => Some(ViewTarget::Live),
        std::cmp::Ordering::Less => Some(ViewTarget::Historical {
            index,
            record: &history[index],
        }),
        std::cmp::Ordering::Greater => None,
    }
}

impl<R: RulesAdapter> GameState<R> {
    /// Show the position at `ply`. Out-of-range plies and the already-viewed
    /// ply are ignored. Any real view change cancels a pending promotion.
    pub fn view_game_ply(&mut self, ply: u32) {
        if ply == self.viewing.ply {
            return;
        }

        let detached = match project(self.start.ply, &self.current.history, ply) {
            None => return,
            Some(ViewTarget::Live) => None,
            Some(ViewTarget::Historical { index, record }) => {
                let last_move = index
                    .checked_sub(1)
                    .map(|prev| &self.current.history[prev])
                    .map(|m| (m.from, m.to));
                match self.rules.inspect(&record.before) {
                    Ok(info) => Some((info, last_move)),
                    Err(e) => {
                        warn!(ply, error = %e, "cannot rebuild historical position");
                        return;
                    }
                }
            }
        };

        self.promotion_canceled();

        match detached {
            None => self.view_live(),
            Some((info, last_move)) => {
                self.viewing.fen = info.fen;
                self.viewing.ply = ply;
                self.viewing.turn_color = info.turn;
                self.viewing.legal_moves = info.legal_moves;
                self.viewing.check = info.check;
                self.viewing.material = info.material;
                self.viewing.last_move = last_move;
            }
        }
    }

    pub fn view_start(&mut self) {
        self.view_game_ply(self.start.ply);
    }

    pub fn view_next(&mut self) {
        let ply = (self.viewing.ply + 1).min(self.current.ply);
        self.view_game_ply(ply);
    }

    pub fn view_previous(&mut self) {
        let ply = self.viewing.ply.saturating_sub(1).max(self.start.ply);
        self.view_game_ply(ply);
    }

    pub fn view_current(&mut self) {
        self.view_game_ply(self.current.ply);
    }
}
