//! Protocol adapters
//!
//! Level 2 - Dialect translation
//!
//! One adapter per seat. It frames canonical positions and moves in the
//! participant's dialect and turns reply lines back into a `Reply`.
//! Framing problems are fatal (`AdapterError`); a well-framed reply that
//! makes no sense is handed back as `Reply::Unrecognized` so the session
//! can count it against the mover's quota.

use roach_core::{Move, MoveString, Outcome, ParticipantId, Position, Side};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::AdapterError;
use crate::participant::Participant;
use crate::transport::Transport;

/// Line protocol spoken by a participant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Universal Hive Protocol engine (`newgame`, `bestmove`, `play`)
    #[default]
    Uhp,
    /// One game string in, one command line out
    Line,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Uhp => write!(f, "uhp"),
            Dialect::Line => write!(f, "line"),
        }
    }
}

/// Informational requests a Line participant may make on its turn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    ValidMoves,
    /// `newgame`: echo the current game string
    Position,
    Info,
}

/// What the mover said
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Move(MoveString),
    Forfeit,
    Undo,
    Query(Query),
    Unrecognized(String),
}

impl Reply {
    pub fn classify(line: &str, dialect: Dialect) -> Reply {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or("");
        let rest: Vec<&str> = words.collect();
        let line_dialect = dialect == Dialect::Line;

        match head {
            "forfeit" | "resign" if rest.is_empty() => Reply::Forfeit,
            "undo" if rest.len() <= 1 && rest.iter().all(|n| n.parse::<u32>().is_ok()) => Reply::Undo,
            "play" if line_dialect && !rest.is_empty() => match rest.join(" ").parse() {
                Ok(mv) => Reply::Move(mv),
                Err(_) => Reply::Unrecognized(line.to_string()),
            },
            "validmoves" if line_dialect && rest.is_empty() => Reply::Query(Query::ValidMoves),
            "newgame" if line_dialect && rest.is_empty() => Reply::Query(Query::Position),
            "info" if line_dialect && rest.is_empty() => Reply::Query(Query::Info),
            _ => match line.parse() {
                Ok(mv) => Reply::Move(mv),
                Err(_) => Reply::Unrecognized(line.to_string()),
            },
        }
    }
}

pub struct ProtocolAdapter {
    participant: ParticipantId,
    side: Side,
    dialect: Dialect,
    transport: Box<dyn Transport>,
    io_timeout: Duration,
    /// Line dialect: position already sent for the current ply
    awaiting_move: bool,
}

impl ProtocolAdapter {
    pub fn new(
        participant: ParticipantId,
        side: Side,
        dialect: Dialect,
        transport: Box<dyn Transport>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            participant,
            side,
            dialect,
            transport,
            io_timeout,
            awaiting_move: false,
        }
    }

    /// Connect to the participant and set up a new game.
    /// Connecting and the handshake share one `io_timeout` budget.
    pub async fn start(
        participant: &Participant,
        side: Side,
        initial: &Position,
        io_timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let deadline = Instant::now() + io_timeout;
        let transport = tokio::time::timeout_at(deadline, participant.connect())
            .await
            .map_err(|_| AdapterError::Timeout)??;

        let mut adapter = Self::new(participant.id, side, participant.dialect, transport, io_timeout);
        adapter.handshake(initial, deadline).await?;
        debug!("{} ({}) ready as {}", participant.name, participant.dialect, side);
        Ok(adapter)
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn disconnect_signal(&self) -> watch::Receiver<bool> {
        self.transport.disconnect_signal()
    }

    async fn handshake(&mut self, initial: &Position, deadline: Instant) -> Result<(), AdapterError> {
        if self.dialect == Dialect::Line {
            return Ok(());
        }
        self.transport.send_line(&format!("newgame {}", initial)).await?;
        loop {
            let block = self.read_block(deadline).await?;
            // Engines announce themselves with an `id` block on startup
            if block.first().is_some_and(|line| line.starts_with("id ")) {
                continue;
            }
            return expect_position(&block, initial);
        }
    }

    /// Ask for the next move
    pub async fn request_move(&mut self, position: &Position, deadline: Instant) -> Result<Reply, AdapterError> {
        match self.dialect {
            Dialect::Uhp => {
                self.transport.send_line("bestmove").await?;
                let block = self.read_block(deadline).await?;
                let line = single_line(block)?;
                Ok(Reply::classify(&line, Dialect::Uhp))
            }
            Dialect::Line => {
                if !self.awaiting_move {
                    self.transport.send_line(&position.to_string()).await?;
                    self.awaiting_move = true;
                }
                // A trailing `ok` after the command is optional
                loop {
                    let line = self.transport.recv_line(deadline).await?;
                    if let Some(reply) = meaningful(&line) {
                        return Ok(reply);
                    }
                }
            }
        }
    }

    /// Line dialect: a command written before this side was sent its
    /// position. Never waits.
    pub fn backlog(&mut self) -> Option<Reply> {
        if self.dialect == Dialect::Uhp || self.awaiting_move {
            return None;
        }
        while let Some(line) = self.transport.buffered_line() {
            if let Some(reply) = meaningful(&line) {
                return Some(reply);
            }
        }
        None
    }

    /// Line dialect: the next command sent while it is not this side's
    /// turn. UHP engines only speak when asked, so this never resolves.
    pub async fn unsolicited(&mut self) -> Result<Reply, AdapterError> {
        if self.dialect == Dialect::Uhp {
            return std::future::pending().await;
        }
        loop {
            let line = self.transport.next_line().await?;
            if let Some(reply) = meaningful(&line) {
                return Ok(reply);
            }
        }
    }

    /// Tell the participant about an accepted move (its own or the opponent's).
    /// A Line mover hears the new game string and `ok`; its opponent hears
    /// nothing until asked to move.
    pub async fn notify(&mut self, mv: &Move, position: &Position) -> Result<(), AdapterError> {
        self.awaiting_move = false;
        match self.dialect {
            Dialect::Line if mv.side == self.side => self.answer(&[position.to_string()]).await,
            Dialect::Line => Ok(()),
            Dialect::Uhp => {
                self.transport.send_line(&format!("play {}", mv)).await?;
                let deadline = Instant::now() + self.io_timeout;
                let block = self.read_block(deadline).await?;
                expect_position(&block, position)
            }
        }
    }

    /// Answer a query: the answer lines, then `ok`
    pub async fn answer(&mut self, lines: &[String]) -> Result<(), AdapterError> {
        if self.dialect == Dialect::Uhp {
            return Ok(());
        }
        for line in lines {
            self.transport.send_line(line).await?;
        }
        self.transport.send_line("ok").await?;
        Ok(())
    }

    /// Report a refused command. UHP engines are simply asked again.
    pub async fn refuse(&mut self, reason: &str) -> Result<(), AdapterError> {
        if self.dialect == Dialect::Uhp {
            return Ok(());
        }
        self.transport.send_line(&format!("err {}", reason)).await?;
        Ok(())
    }

    /// Undo is acknowledged with the unchanged position
    pub async fn acknowledge_undo(&mut self, position: &Position) -> Result<(), AdapterError> {
        self.answer(&[position.to_string()]).await
    }

    /// Close the channel. A faulted participant gets no further traffic.
    pub async fn terminate(mut self, outcome: &Outcome, faulted: bool) {
        if !faulted && self.dialect == Dialect::Line {
            let _ = self
                .transport
                .send_line(&format!("gameover {}", outcome.status()))
                .await;
        }
        self.transport.close().await;
    }

    /// Lines up to the next `ok`. Error blocks are fatal.
    async fn read_block(&mut self, deadline: Instant) -> Result<Vec<String>, AdapterError> {
        let mut block = Vec::new();
        loop {
            let line = self.transport.recv_line(deadline).await?;
            let line = line.trim();
            if line == "ok" {
                break;
            }
            if !line.is_empty() {
                block.push(line.to_string());
            }
        }
        if let Some(first) = block.first() {
            if first.starts_with("err") || first.starts_with("invalidmove") {
                return Err(AdapterError::Protocol(block.join(" / ")));
            }
        }
        Ok(block)
    }
}

/// Line dialect: blank lines and stray `ok`s carry nothing
fn meaningful(line: &str) -> Option<Reply> {
    let line = line.trim();
    if line.is_empty() || line == "ok" {
        return None;
    }
    Some(Reply::classify(line, Dialect::Line))
}

fn single_line(mut block: Vec<String>) -> Result<String, AdapterError> {
    if block.len() != 1 {
        return Err(AdapterError::Protocol(format!(
            "expected exactly one line before ok, got {}",
            block.len()
        )));
    }
    Ok(block.remove(0))
}

/// The engine's game string must agree on type, ply count and turn
fn expect_position(block: &[String], expected: &Position) -> Result<(), AdapterError> {
    let line = single_line(block.to_vec())?;
    let reported: Position = line
        .parse()
        .map_err(|e| AdapterError::Protocol(format!("unparseable game string `{}`: {}", line, e)))?;

    if reported.game_type() != expected.game_type()
        || reported.ply_count() != expected.ply_count()
        || reported.turn_string() != expected.turn_string()
    {
        return Err(AdapterError::Protocol(format!(
            "engine reports `{}`, relay has `{}`",
            reported, expected
        )));
    }
    Ok(())
}
