//! Material balance summary for the board projection.

use shakmaty::{Board, Color, Role};

const COUNTED_ROLES: [Role; 5] = [Role::Queen, Role::Rook, Role::Bishop, Role::Knight, Role::Pawn];

/// Conventional piece value in pawns
pub fn piece_value(role: Role) -> i32 {
    match role {
        Role::Pawn => 1,
        Role::Knight | Role::Bishop => 3,
        Role::Rook => 5,
        Role::Queen => 9,
        Role::King => 0,
    }
}

/// Material difference between the two sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialInfo {
    pub white_points: i32,
    pub black_points: i32,
    /// Per-role count surplus, positive favors White. Roles in balance are omitted.
    pub imbalance: Vec<(Role, i32)>,
}

impl MaterialInfo {
    pub fn from_board(board: &Board) -> Self {
        let mut info = MaterialInfo::default();

        for role in COUNTED_ROLES {
            let white = count(board, Color::White, role);
            let black = count(board, Color::Black, role);

            info.white_points += white * piece_value(role);
            info.black_points += black * piece_value(role);

            if white != black {
                info.imbalance.push((role, white - black));
            }
        }

        info
    }

    /// Point advantage, positive favors White
    pub fn advantage(&self) -> i32 {
        self.white_points - self.black_points
    }
}

fn count(board: &Board, color: Color, role: Role) -> i32 {
    (board.by_color(color) & board.by_role(role)).count() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::{fen::Fen, CastlingMode, Chess, Position};

    fn board(fen: &str) -> Board {
        let pos: Chess = fen
            .parse::<Fen>()
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap();
        pos.board().clone()
    }

    #[test]
    fn test_start_position_is_balanced() {
        let info = MaterialInfo::from_board(Chess::default().board());
        assert_eq!(info.white_points, 39);
        assert_eq!(info.black_points, 39);
        assert_eq!(info.advantage(), 0);
        assert!(info.imbalance.is_empty());
    }

    #[test]
    fn test_rook_for_knight() {
        let info = MaterialInfo::from_board(&board("4k3/8/8/8/8/8/8/R3K3 w - - 0 1"));
        assert_eq!(info.advantage(), 5);
        assert_eq!(info.imbalance, vec![(Role::Rook, 1)]);

        let info = MaterialInfo::from_board(&board("4k1n1/8/8/8/8/8/8/R3K3 w - - 0 1"));
        assert_eq!(info.advantage(), 2);
        assert_eq!(info.imbalance, vec![(Role::Rook, 1), (Role::Knight, -1)]);
    }
}
