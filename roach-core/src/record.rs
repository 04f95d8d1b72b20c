//! Moves, outcomes and the append-only game record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NotationError, RecordError};
use crate::notation::{MoveString, Side};
use crate::position::{GameStatus, GameType, Position};
use crate::rules::RulesValidator;

/// Identity handle of a registered participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant-{}", self.0)
    }
}

/// Identity of a game session (and of the record it produces)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A move attributed to the side that made it
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub side: Side,
    pub notation: MoveString,
}

impl Move {
    pub fn new(side: Side, notation: MoveString) -> Self {
        Self { side, notation }
    }

    /// Parse a move string on behalf of `side`
    pub fn parse(side: Side, text: &str) -> Result<Self, NotationError> {
        Ok(Self {
            side,
            notation: text.parse()?,
        })
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.notation)
    }
}

/// Why a side lost without being beaten over the board
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReason {
    Timeout,
    ProtocolBreach,
    VoluntaryForfeit,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::Timeout => write!(f, "timeout"),
            FaultReason::ProtocolBreach => write!(f, "protocol breach"),
            FaultReason::VoluntaryForfeit => write!(f, "voluntary forfeit"),
        }
    }
}

/// Final result of a game. Set exactly once per record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Win { winner: Side },
    Draw,
    Fault { side: Side, reason: FaultReason },
}

impl Outcome {
    /// Winning side; a fault hands the win to the opponent
    pub fn winner(&self) -> Option<Side> {
        match self {
            Outcome::Win { winner } => Some(*winner),
            Outcome::Draw => None,
            Outcome::Fault { side, .. } => Some(side.opponent()),
        }
    }

    pub fn loser(&self) -> Option<Side> {
        self.winner().map(Side::opponent)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Fault { .. })
    }

    /// Game score from `side`'s perspective (1, 0.5 or 0)
    pub fn score_for(&self, side: Side) -> f64 {
        match self.winner() {
            Some(winner) if winner == side => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        }
    }

    /// Status as it would appear in a game string
    pub fn status(&self) -> GameStatus {
        match self.winner() {
            Some(winner) => GameStatus::Win(winner),
            None => GameStatus::Draw,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win { winner } => write!(f, "{} wins", winner),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Fault { side, reason } => write!(f, "{} faulted ({})", side, reason),
        }
    }
}

/// One accepted ply and the state it produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyEntry {
    /// 1-based ply number
    pub number: u32,
    pub mv: Move,
    pub position: Position,
    /// Wall time the mover spent on this ply
    pub elapsed_ms: u64,
    /// Mover's clock after this ply (increment included)
    pub remaining_ms: u64,
}

/// Canonical, append-only record of one game
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: SessionId,
    pub white: ParticipantId,
    pub black: ParticipantId,
    pub game_type: GameType,
    pub tournament: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub initial: Position,
    plies: Vec<PlyEntry>,
    outcome: Option<Outcome>,
    pub comment: String,
}

impl GameRecord {
    pub fn new(
        id: SessionId,
        white: ParticipantId,
        black: ParticipantId,
        game_type: GameType,
        tournament: bool,
    ) -> Self {
        Self {
            id,
            white,
            black,
            game_type,
            tournament,
            started_at: Utc::now(),
            ended_at: None,
            initial: Position::new(game_type),
            plies: Vec::new(),
            outcome: None,
            comment: String::new(),
        }
    }

    pub fn participant(&self, side: Side) -> ParticipantId {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    pub fn plies(&self) -> &[PlyEntry] {
        &self.plies
    }

    /// Accepted moves in order
    pub fn moves(&self) -> impl Iterator<Item = &Move> {
        self.plies.iter().map(|p| &p.mv)
    }

    /// Current position (the initial one before any ply)
    pub fn position(&self) -> &Position {
        self.plies
            .last()
            .map(|p| &p.position)
            .unwrap_or(&self.initial)
    }

    pub fn to_move(&self) -> Side {
        self.position().to_move()
    }

    /// Number of plies `side` has made so far
    pub fn plies_by(&self, side: Side) -> usize {
        self.plies.iter().filter(|p| p.mv.side == side).count()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Append an accepted ply. Turn order is enforced here as a last line;
    /// legality is the caller's business.
    pub fn append(
        &mut self,
        mv: Move,
        position: Position,
        elapsed_ms: u64,
        remaining_ms: u64,
    ) -> Result<&PlyEntry, RecordError> {
        if self.outcome.is_some() {
            return Err(RecordError::AlreadyFinished);
        }
        let expected = self.to_move();
        if mv.side != expected {
            return Err(RecordError::OutOfTurn {
                expected,
                found: mv.side,
            });
        }

        let number = self.plies.len() as u32 + 1;
        self.plies.push(PlyEntry {
            number,
            mv,
            position,
            elapsed_ms,
            remaining_ms,
        });
        Ok(&self.plies[self.plies.len() - 1])
    }

    /// Freeze the record with its single outcome
    pub fn finish(&mut self, outcome: Outcome, comment: impl Into<String>) -> Result<(), RecordError> {
        if self.outcome.is_some() {
            return Err(RecordError::AlreadyFinished);
        }
        self.outcome = Some(outcome);
        self.ended_at = Some(Utc::now());
        self.comment = comment.into();
        Ok(())
    }

    /// Re-apply every move from the initial position and check each stored
    /// position along the way. Returns the final position.
    pub fn replay(&self, rules: &dyn RulesValidator) -> Result<Position, RecordError> {
        let mut position = self.initial.clone();
        for entry in &self.plies {
            position = advance(&position, &entry.mv, rules);
            if position != entry.position {
                return Err(RecordError::ReplayDiverged { ply: entry.number });
            }
        }
        Ok(position)
    }
}

/// Apply a move and stamp the rules verdict onto the resulting position.
/// Shared by live play and replay so both derive positions identically.
pub fn advance(position: &Position, mv: &Move, rules: &dyn RulesValidator) -> Position {
    let next = position.apply(&mv.notation);
    match rules.terminal_verdict(&next) {
        Some(verdict) => next.with_status(verdict.status()),
        None => next,
    }
}
