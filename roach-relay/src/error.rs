//! Error taxonomy for the relay
//!
//! Recoverable: `Rejection` (an illegal move, retried under quota).
//! Fatal to a session: `AdapterError`. Fatal to a rating update only:
//! `RepositoryError::RatingUpdateConflict`, retried both-or-nothing.

use roach_core::{ParticipantId, Side};

use crate::tickets::TicketId;

/// Failure of the raw line channel
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("deadline elapsed")]
    Timeout,

    #[error("peer disconnected")]
    Disconnected,

    #[error("i/o failure: {0}")]
    Io(String),
}

/// Failure to establish a participant's duplex channel
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },
}

/// Fatal protocol-level failure of one participant
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("timed out waiting for reply")]
    Timeout,

    #[error("participant disconnected")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

impl From<TransportError> for AdapterError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => AdapterError::Timeout,
            TransportError::Disconnected => AdapterError::Disconnected,
            TransportError::Io(msg) => AdapterError::Protocol(msg),
        }
    }
}

/// Why a well-framed reply was refused. The mover may try again.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("game is not in progress")]
    NotInProgress,

    #[error("out of turn: {expected} to move, got a move for {found}")]
    OutOfTurn { expected: Side, found: Side },

    #[error("tournament rule: the queen may not be placed on a side's first ply")]
    TournamentOpening,

    #[error("illegal move {0}")]
    RulesViolation(String),

    #[error("unrecognized command `{0}`")]
    Unrecognized(String),

    #[error("out of turn: {0} has not been asked to move")]
    Unrequested(Side),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("ratings changed concurrently")]
    RatingUpdateConflict,

    #[error("no stored rating for {0}")]
    NotFound(ParticipantId),

    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    #[error("{0} already has a waiting ticket")]
    AlreadyQueued(ParticipantId),

    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    #[error("unknown ticket {0}")]
    UnknownTicket(TicketId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
