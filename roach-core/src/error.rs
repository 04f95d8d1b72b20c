//! Error types for notation parsing and record bookkeeping

use crate::notation::Side;

/// Failure to parse a UHP token, move string or game string
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NotationError {
    #[error("empty input")]
    Empty,

    #[error("unknown side `{0}`")]
    UnknownSide(String),

    #[error("unknown bug `{0}`")]
    UnknownBug(char),

    #[error("invalid piece ordinal in `{0}`")]
    BadOrdinal(String),

    #[error("malformed move string `{0}`")]
    BadMove(String),

    #[error("unrecognized game type `{0}`")]
    BadGameType(String),

    #[error("unrecognized game status `{0}`")]
    BadStatus(String),

    #[error("malformed turn string `{0}`")]
    BadTurn(String),

    #[error("turn string {found} does not match move list (expected {expected})")]
    TurnMismatch { expected: String, found: String },

    #[error("game string is missing its {0}")]
    MissingField(&'static str),
}

/// Violation of the append-only record discipline
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("move by {found} out of turn, {expected} to move")]
    OutOfTurn { expected: Side, found: Side },

    #[error("record already has an outcome")]
    AlreadyFinished,

    #[error("replay diverged from stored position at ply {ply}")]
    ReplayDiverged { ply: u32 },
}
