//! Synchronous session core
//!
//! Level 3 - Game arbitration
//!
//! The referee owns the record, both clocks and the per-ply illegal-move
//! counter. It performs no I/O; `GameSession` feeds it replies and
//! elapsed time.

use roach_core::{advance, GameRecord, GameStatus, Move, Outcome, PlyEntry, RecordError, RulesValidator, Side};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TimeControl;
use crate::error::Rejection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingStart,
    InProgress,
    Completed,
    Faulted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Faulted)
    }
}

/// Mover's clock ran out while it was thinking
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockExpired;

/// Mover used up its illegal-move allowance for this ply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaExhausted;

pub struct Referee {
    record: GameRecord,
    rules: Arc<dyn RulesValidator>,
    state: SessionState,
    time_control: TimeControl,
    clocks: [Duration; 2],
    /// Time charged to each side since its last accepted move
    thinking: [Duration; 2],
    quota: u32,
    attempts: u32,
}

impl Referee {
    pub fn new(record: GameRecord, rules: Arc<dyn RulesValidator>, time_control: TimeControl, quota: u32) -> Self {
        let initial = time_control.initial();
        Self {
            record,
            rules,
            state: SessionState::AwaitingStart,
            time_control,
            clocks: [initial, initial],
            thinking: [Duration::ZERO; 2],
            quota,
            attempts: 0,
        }
    }

    /// AwaitingStart -> InProgress; clocks are reset to the initial budget
    pub fn start(&mut self) {
        if self.state == SessionState::AwaitingStart {
            let initial = self.time_control.initial();
            self.clocks = [initial, initial];
            self.state = SessionState::InProgress;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn into_record(self) -> GameRecord {
        self.record
    }

    pub fn rules(&self) -> &dyn RulesValidator {
        self.rules.as_ref()
    }

    pub fn to_move(&self) -> Side {
        self.record.to_move()
    }

    pub fn remaining(&self, side: Side) -> Duration {
        self.clocks[side.index()]
    }

    pub fn ply_count(&self) -> usize {
        self.record.plies().len()
    }

    /// Deduct thinking time from `side`'s clock
    pub fn charge(&mut self, side: Side, elapsed: Duration) -> Result<Duration, ClockExpired> {
        let clock = &mut self.clocks[side.index()];
        *clock = clock.saturating_sub(elapsed);
        self.thinking[side.index()] += elapsed;
        if clock.is_zero() {
            return Err(ClockExpired);
        }
        Ok(*clock)
    }

    /// Validate and append a move. A rejection leaves the record untouched.
    pub fn submit(&mut self, mv: Move) -> Result<&PlyEntry, Rejection> {
        if self.state != SessionState::InProgress {
            return Err(Rejection::NotInProgress);
        }
        let expected = self.record.to_move();
        if mv.side != expected {
            return Err(Rejection::OutOfTurn {
                expected,
                found: mv.side,
            });
        }
        if self.record.tournament
            && self.record.plies_by(mv.side) == 0
            && self.rules.places_controlling_piece(&mv)
        {
            return Err(Rejection::TournamentOpening);
        }
        let position = self.record.position();
        if !self.rules.is_legal(position, &mv, mv.side) {
            return Err(Rejection::RulesViolation(mv.to_string()));
        }

        let next = advance(position, &mv, self.rules.as_ref());
        let index = mv.side.index();
        self.clocks[index] += self.time_control.increment();
        let elapsed = std::mem::take(&mut self.thinking[index]);
        self.attempts = 0;

        self.record
            .append(mv, next, elapsed.as_millis() as u64, self.clocks[index].as_millis() as u64)
            .map_err(|e| match e {
                RecordError::OutOfTurn { expected, found } => Rejection::OutOfTurn { expected, found },
                _ => Rejection::NotInProgress,
            })
    }

    /// Count one illegal reply against the mover
    pub fn reject(&mut self) -> Result<u32, QuotaExhausted> {
        self.attempts += 1;
        if self.attempts > self.quota {
            return Err(QuotaExhausted);
        }
        Ok(self.quota - self.attempts)
    }

    /// Outcome dictated by the rules verdict on the current position
    pub fn verdict(&self) -> Option<Outcome> {
        match self.record.position().status() {
            GameStatus::Win(winner) => Some(Outcome::Win { winner }),
            GameStatus::Draw => Some(Outcome::Draw),
            _ => None,
        }
    }

    /// Enter the terminal state matching `outcome`. Happens once.
    pub fn finish(&mut self, outcome: Outcome, comment: impl Into<String>) -> Result<SessionState, RecordError> {
        self.record.finish(outcome, comment)?;
        self.state = if outcome.is_fault() {
            SessionState::Faulted
        } else {
            SessionState::Completed
        };
        Ok(self.state)
    }
}
