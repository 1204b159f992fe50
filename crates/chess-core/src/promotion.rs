//! The single in-flight promotion choice.
//!
//! A move that needs a promotion piece is parked here as a continuation. The
//! UI resolves it through `GameState::promotion_selected` or
//! `GameState::promotion_canceled`; whoever requested the move learns the
//! result from its `PromotionTicket`.

use shakmaty::{Color, Square};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::debug;

use crate::error::ChessError;
use crate::rules::{MoveRecord, MoveRequest};

/// Result delivered to a promotion ticket
pub type PromotionOutcome = Result<MoveRecord, ChessError>;

/// Promotion prompt state exposed to the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromotionDialog {
    #[default]
    Disabled,
    Awaiting {
        id: u64,
        color: Color,
        square: Square,
    },
}

impl PromotionDialog {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, PromotionDialog::Awaiting { .. })
    }
}

/// The move waiting for its promotion piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPromotion {
    pub request: MoveRequest,
    /// Game generation the move was requested against
    pub generation: u64,
}

/// Resolves a ticket exactly once.
#[derive(Debug)]
pub struct Resolver(oneshot::Sender<PromotionOutcome>);

impl Resolver {
    pub fn resolve(self, outcome: PromotionOutcome) {
        // The requester may have dropped its ticket
        let _ = self.0.send(outcome);
    }
}

#[derive(Debug)]
struct Suspended {
    id: u64,
    color: Color,
    square: Square,
    pending: PendingPromotion,
    resolver: Resolver,
}

/// Handle returned to the caller whose move is waiting on a promotion choice.
#[derive(Debug)]
pub struct PromotionTicket {
    id: u64,
    rx: oneshot::Receiver<PromotionOutcome>,
}

impl PromotionTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the choice. A dropped resolver reads as canceled.
    pub async fn outcome(self) -> PromotionOutcome {
        self.rx.await.unwrap_or(Err(ChessError::PromotionCanceled))
    }

    /// Non-blocking poll; `None` while the choice is still open.
    pub fn try_outcome(&mut self) -> Option<PromotionOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(ChessError::PromotionCanceled)),
        }
    }
}

/// Holds at most one suspended promotion.
#[derive(Debug, Default)]
pub struct PromotionCoordinator {
    suspended: Option<Suspended>,
    next_id: u64,
}

impl PromotionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialog(&self) -> PromotionDialog {
        match &self.suspended {
            Some(s) => PromotionDialog::Awaiting {
                id: s.id,
                color: s.color,
                square: s.square,
            },
            None => PromotionDialog::Disabled,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.suspended.is_some()
    }

    /// Park a move. Any older suspended move is canceled first.
    pub fn begin(
        &mut self,
        color: Color,
        square: Square,
        pending: PendingPromotion,
    ) -> PromotionTicket {
        self.cancel();

        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.suspended = Some(Suspended {
            id: self.next_id,
            color,
            square,
            pending,
            resolver: Resolver(tx),
        });
        debug!(id = self.next_id, %square, "promotion awaiting choice");

        PromotionTicket {
            id: self.next_id,
            rx,
        }
    }

    /// Hand over the suspended move for completion.
    pub fn take(&mut self) -> Option<(PendingPromotion, Resolver)> {
        self.suspended.take().map(|s| (s.pending, s.resolver))
    }

    /// Resolve the suspended move as canceled. Returns whether one existed.
    pub fn cancel(&mut self) -> bool {
        match self.suspended.take() {
            Some(s) => {
                debug!(id = s.id, "promotion canceled");
                s.resolver.resolve(Err(ChessError::PromotionCanceled));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingPromotion {
        PendingPromotion {
            request: MoveRequest::new(Square::A7, Square::A8),
            generation: 0,
        }
    }

    #[test]
    fn test_begin_exposes_dialog() {
        let mut coordinator = PromotionCoordinator::new();
        assert_eq!(coordinator.dialog(), PromotionDialog::Disabled);

        let ticket = coordinator.begin(Color::White, Square::A8, pending());
        assert_eq!(
            coordinator.dialog(),
            PromotionDialog::Awaiting {
                id: ticket.id(),
                color: Color::White,
                square: Square::A8
            }
        );
    }

    #[test]
    fn test_new_choice_cancels_stale_one() {
        let mut coordinator = PromotionCoordinator::new();
        let mut first = coordinator.begin(Color::White, Square::A8, pending());
        let mut second = coordinator.begin(Color::White, Square::B8, pending());

        assert_eq!(first.try_outcome(), Some(Err(ChessError::PromotionCanceled)));
        assert_eq!(second.try_outcome(), None);
        assert!(matches!(
            coordinator.dialog(),
            PromotionDialog::Awaiting { square: Square::B8, .. }
        ));
    }

    #[test]
    fn test_cancel_without_choice_is_noop() {
        let mut coordinator = PromotionCoordinator::new();
        assert!(!coordinator.cancel());
        assert!(coordinator.take().is_none());
    }

    #[tokio::test]
    async fn test_dropped_resolver_reads_as_canceled() {
        let mut coordinator = PromotionCoordinator::new();
        let ticket = coordinator.begin(Color::Black, Square::H1, pending());
        drop(coordinator.take());
        assert_eq!(ticket.outcome().await, Err(ChessError::PromotionCanceled));
    }
}
