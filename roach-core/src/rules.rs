//! Rules-validation seam
//!
//! The arena never decides move legality itself. A `RulesValidator` is
//! injected into every session; `NotationRules` is the default and checks
//! only what can be verified from notation alone.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::notation::{Anchor, Bug, MoveString, PieceToken, Side};
use crate::position::{GameStatus, Position};
use crate::record::Move;

/// Terminal judgement on a position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Win(Side),
    Draw,
}

impl Verdict {
    pub fn status(self) -> GameStatus {
        match self {
            Verdict::Win(side) => GameStatus::Win(side),
            Verdict::Draw => GameStatus::Draw,
        }
    }
}

/// Pure, shareable rules capability consumed by the relay
pub trait RulesValidator: Send + Sync {
    /// Whether `side` may play `mv` in `position`
    fn is_legal(&self, position: &Position, mv: &Move, side: Side) -> bool;

    /// `Some` once the position is decided
    fn terminal_verdict(&self, position: &Position) -> Option<Verdict>;

    /// Whether `mv` places the piece whose loss ends the game.
    /// Used by the tournament opening restriction.
    fn places_controlling_piece(&self, mv: &Move) -> bool;

    /// All legal move strings, when the validator can enumerate them
    fn legal_moves(&self, _position: &Position) -> Option<Vec<MoveString>> {
        None
    }
}

/// Notation-level validator.
///
/// Checks piece ownership, expansion availability, inventory limits,
/// placement ordinals and that anchors refer to pieces already in play.
/// It never declares a game over.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotationRules;

impl NotationRules {
    /// Pieces that have entered play, in order of first appearance
    fn pieces_in_play(position: &Position) -> FxHashSet<PieceToken> {
        position.moves().iter().filter_map(MoveString::piece).collect()
    }

    fn placed_counts(in_play: &FxHashSet<PieceToken>) -> FxHashMap<(Side, Bug), u8> {
        let mut counts = FxHashMap::default();
        for piece in in_play {
            *counts.entry((piece.owner, piece.bug)).or_insert(0) += 1;
        }
        counts
    }
}

impl RulesValidator for NotationRules {
    fn is_legal(&self, position: &Position, mv: &Move, side: Side) -> bool {
        if mv.side != side || position.status().is_terminal() {
            return false;
        }
        let (piece, anchor) = match &mv.notation {
            MoveString::Pass => return true,
            MoveString::Piece { piece, anchor } => (*piece, *anchor),
        };
        if piece.owner != side || !position.game_type().allows(piece.bug) {
            return false;
        }

        let in_play = Self::pieces_in_play(position);

        match anchor {
            None => {
                if !position.moves().is_empty() {
                    return false;
                }
            }
            Some(anchor) => {
                if position.moves().is_empty() || !in_play.contains(&anchor.piece()) {
                    return false;
                }
            }
        }

        if in_play.contains(&piece) {
            return true;
        }

        // New placement: never onto another piece, and ordinals go in order
        if matches!(anchor, Some(Anchor::OnTop(_))) {
            return false;
        }
        let placed = Self::placed_counts(&in_play)
            .get(&(piece.owner, piece.bug))
            .copied()
            .unwrap_or(0);
        if placed >= piece.bug.count() {
            return false;
        }
        match piece.ordinal {
            Some(n) => n == placed + 1,
            None => true,
        }
    }

    fn terminal_verdict(&self, _position: &Position) -> Option<Verdict> {
        None
    }

    fn places_controlling_piece(&self, mv: &Move) -> bool {
        mv.notation.piece().map(|p| p.bug == Bug::Queen).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::GameType;

    fn position(moves: &[&str]) -> Position {
        moves.iter().fold(Position::new(GameType::Base), |pos, m| {
            pos.apply(&m.parse().unwrap())
        })
    }

    fn legal(pos: &Position, side: Side, text: &str) -> bool {
        NotationRules.is_legal(pos, &Move::parse(side, text).unwrap(), side)
    }

    #[test]
    fn test_opening_placement_has_no_anchor() {
        let empty = position(&[]);
        assert!(legal(&empty, Side::White, "wS1"));
        assert!(!legal(&empty, Side::White, "wS1 bQ-"));
        assert!(!legal(&empty, Side::White, "bS1"));
    }

    #[test]
    fn test_later_moves_need_known_anchor() {
        let pos = position(&["wS1"]);
        assert!(legal(&pos, Side::Black, "bS1 wS1-"));
        assert!(!legal(&pos, Side::Black, "bS1"));
        assert!(!legal(&pos, Side::Black, "bS1 wA1-"));
    }

    #[test]
    fn test_ordinals_and_inventory() {
        let pos = position(&["wA1", "bS1 wA1-", "wA2 -wA1", "bS2 bS1-"]);
        // moving a piece already in play
        assert!(legal(&pos, Side::White, "wA1 /wA2"));
        assert!(legal(&pos, Side::White, "wA3 \\wA1"));
        assert!(!legal(&pos, Side::White, "wA3 wA1"));

        let pos = position(&["wQ", "bS1 wQ-", "wS1 -wQ", "bS2 bS1-", "wS2 -wS1"]);
        assert!(!legal(&pos, Side::Black, "bA2 bS2-"));
        assert!(legal(&pos, Side::Black, "bA1 bS2-"));
    }

    #[test]
    fn test_expansion_pieces_need_game_type() {
        let base = position(&["wS1"]);
        assert!(!legal(&base, Side::Black, "bM wS1-"));

        let plm = Position::new("Base+PLM".parse().unwrap()).apply(&"wS1".parse().unwrap());
        assert!(legal(&plm, Side::Black, "bM wS1-"));
    }

    #[test]
    fn test_controlling_piece_is_queen() {
        assert!(NotationRules.places_controlling_piece(&Move::parse(Side::White, "wQ").unwrap()));
        assert!(!NotationRules.places_controlling_piece(&Move::parse(Side::White, "wS1").unwrap()));
        assert!(!NotationRules.places_controlling_piece(&Move::parse(Side::White, "pass").unwrap()));
    }

    #[test]
    fn test_wrong_side_is_illegal() {
        let pos = position(&["wS1"]);
        let mv = Move::parse(Side::White, "wS2 wS1-").unwrap();
        assert!(!NotationRules.is_legal(&pos, &mv, Side::Black));
        assert!(NotationRules.terminal_verdict(&pos).is_none());
    }
}
