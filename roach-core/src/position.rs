//! Positions as UHP game strings
//!
//! `GameType;GameStatus;Side[turn];move;move;...`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NotationError;
use crate::notation::{Bug, MoveString, Side};

/// Which expansion pieces are in play
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GameType {
    #[default]
    Base,
    Expansion {
        pillbug: bool,
        ladybug: bool,
        mosquito: bool,
    },
}

impl GameType {
    /// Whether a bug may be used at all in this game type
    pub fn allows(self, bug: Bug) -> bool {
        match (self, bug) {
            (_, b) if !b.is_expansion() => true,
            (GameType::Base, _) => false,
            (GameType::Expansion { pillbug, .. }, Bug::Pillbug) => pillbug,
            (GameType::Expansion { ladybug, .. }, Bug::Ladybug) => ladybug,
            (GameType::Expansion { mosquito, .. }, Bug::Mosquito) => mosquito,
            _ => false,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Base => write!(f, "Base"),
            GameType::Expansion {
                pillbug,
                ladybug,
                mosquito,
            } => {
                let p = if *pillbug { "P" } else { "" };
                let l = if *ladybug { "L" } else { "" };
                let m = if *mosquito { "M" } else { "" };
                write!(f, "Base+{}{}{}", p, l, m)
            }
        }
    }
}

impl FromStr for GameType {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "Base" {
            return Ok(GameType::Base);
        }
        let letters = s
            .strip_prefix("Base+")
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| NotationError::BadGameType(s.to_string()))?;

        // Expansion letters must appear at most once, in P, L, M order
        let mut remaining = letters;
        let mut take = |letter: char| match remaining.strip_prefix(letter) {
            Some(rest) => {
                remaining = rest;
                true
            }
            None => false,
        };
        let pillbug = take('P');
        let ladybug = take('L');
        let mosquito = take('M');
        if !remaining.is_empty() {
            return Err(NotationError::BadGameType(s.to_string()));
        }

        Ok(GameType::Expansion {
            pillbug,
            ladybug,
            mosquito,
        })
    }
}

impl TryFrom<String> for GameType {
    type Error = NotationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GameType> for String {
    fn from(value: GameType) -> Self {
        value.to_string()
    }
}

/// Game status field of a game string
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameStatus {
    NotStarted,
    InProgress,
    Draw,
    Win(Side),
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Draw | GameStatus::Win(_))
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::NotStarted => write!(f, "NotStarted"),
            GameStatus::InProgress => write!(f, "InProgress"),
            GameStatus::Draw => write!(f, "Draw"),
            GameStatus::Win(side) => write!(f, "{}Wins", side),
        }
    }
}

impl FromStr for GameStatus {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotStarted" => Ok(GameStatus::NotStarted),
            "InProgress" => Ok(GameStatus::InProgress),
            "Draw" => Ok(GameStatus::Draw),
            "WhiteWins" => Ok(GameStatus::Win(Side::White)),
            "BlackWins" => Ok(GameStatus::Win(Side::Black)),
            other => Err(NotationError::BadStatus(other.to_string())),
        }
    }
}

/// Canonical board state: the game type, status and full move history.
///
/// Positions are values; `apply` returns a new position rather than
/// mutating, so a record can keep the position after every ply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position {
    game_type: GameType,
    status: GameStatus,
    moves: Vec<MoveString>,
}

impl Position {
    /// Fresh game with no moves played
    pub fn new(game_type: GameType) -> Self {
        Self {
            game_type,
            status: GameStatus::NotStarted,
            moves: Vec::new(),
        }
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn moves(&self) -> &[MoveString] {
        &self.moves
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }

    /// Side whose turn it is
    pub fn to_move(&self) -> Side {
        if self.moves.len() % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }

    /// Full-turn number shown in the turn string (both sides share a turn)
    pub fn turn_number(&self) -> usize {
        self.moves.len() / 2 + 1
    }

    pub fn turn_string(&self) -> String {
        format!("{}[{}]", self.to_move(), self.turn_number())
    }

    /// Position after appending one move
    pub fn apply(&self, mv: &MoveString) -> Position {
        let mut next = self.clone();
        next.moves.push(mv.clone());
        if next.status == GameStatus::NotStarted {
            next.status = GameStatus::InProgress;
        }
        next
    }

    pub fn with_status(mut self, status: GameStatus) -> Position {
        self.status = status;
        self
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.game_type, self.status, self.turn_string())?;
        for mv in &self.moves {
            write!(f, ";{}", mv)?;
        }
        Ok(())
    }
}

impl FromStr for Position {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.trim().split(';');
        let game_type: GameType = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or(NotationError::MissingField("game type"))?
            .parse()?;
        let status: GameStatus = fields
            .next()
            .ok_or(NotationError::MissingField("game status"))?
            .parse()?;
        let turn = fields
            .next()
            .ok_or(NotationError::MissingField("turn string"))?;
        validate_turn_string(turn)?;

        let moves = fields
            .map(|token| token.parse::<MoveString>())
            .collect::<Result<Vec<_>, _>>()?;
        let position = Position {
            game_type,
            status,
            moves,
        };

        let expected = position.turn_string();
        if expected != turn {
            return Err(NotationError::TurnMismatch {
                expected,
                found: turn.to_string(),
            });
        }
        Ok(position)
    }
}

impl TryFrom<String> for Position {
    type Error = NotationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.to_string()
    }
}

fn validate_turn_string(turn: &str) -> Result<(), NotationError> {
    let bad = || NotationError::BadTurn(turn.to_string());
    let (side, rest) = turn.split_once('[').ok_or_else(bad)?;
    let number = rest.strip_suffix(']').ok_or_else(bad)?;
    side.parse::<Side>().map_err(|_| bad())?;
    match number.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(()),
        _ => Err(bad()),
    }
}
