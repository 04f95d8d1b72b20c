//! Roach Core - Canonical game representation and rating math
//!
//! This crate provides the shared vocabulary of the arena:
//! - UHP notation (sides, piece tokens, move strings)
//! - Positions as UHP game strings
//! - Append-only game records and outcomes
//! - The injectable rules-validation seam
//! - Elo rating exchange

pub mod error;
pub mod notation;
pub mod position;
pub mod rating;
pub mod record;
pub mod rules;

// Re-exports for convenient access
pub use error::{NotationError, RecordError};
pub use notation::{Anchor, Bug, Direction, MoveString, PieceToken, Side};
pub use position::{GameStatus, GameType, Position};
pub use rating::{exchange, expected_score, Rating, RatingDelta, DEFAULT_K_FACTOR, INITIAL_RATING};
pub use record::{advance, FaultReason, GameRecord, Move, Outcome, ParticipantId, PlyEntry, SessionId};
pub use rules::{NotationRules, RulesValidator, Verdict};
