//! UHP notation: sides, piece tokens and move strings
//!
//! A move string is either `pass`, a bare piece (`wS1`, only legal as the
//! opening placement), or a piece followed by an anchor describing where it
//! lands relative to a piece already on the board:
//!
//! ```text
//! bS1 wS1-    east of wS1
//! bS1 -wS1    west of wS1
//! bS1 wS1/    north-east of wS1
//! bS1 /wS1    south-west of wS1
//! bS1 wS1\    south-east of wS1
//! bS1 \wS1    north-west of wS1
//! wB1 bQ      on top of bQ
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NotationError;

// ============================================================================
// SIDES
// ============================================================================

/// Player colour. White always makes the first ply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::White, Side::Black];

    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Colour prefix used in piece tokens
    pub fn prefix(self) -> char {
        match self {
            Side::White => 'w',
            Side::Black => 'b',
        }
    }

    /// Stable array index (white = 0)
    pub fn index(self) -> usize {
        match self {
            Side::White => 0,
            Side::Black => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "White"),
            Side::Black => write!(f, "Black"),
        }
    }
}

impl FromStr for Side {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "White" => Ok(Side::White),
            "Black" => Ok(Side::Black),
            other => Err(NotationError::UnknownSide(other.to_string())),
        }
    }
}

// ============================================================================
// PIECES
// ============================================================================

/// Bug kinds. Mosquito, Ladybug and Pillbug are expansion pieces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bug {
    Ant,
    Beetle,
    Grasshopper,
    Queen,
    Spider,
    Mosquito,
    Ladybug,
    Pillbug,
}

impl Bug {
    pub fn from_letter(c: char) -> Option<Bug> {
        match c {
            'A' => Some(Bug::Ant),
            'B' => Some(Bug::Beetle),
            'G' => Some(Bug::Grasshopper),
            'Q' => Some(Bug::Queen),
            'S' => Some(Bug::Spider),
            'M' => Some(Bug::Mosquito),
            'L' => Some(Bug::Ladybug),
            'P' => Some(Bug::Pillbug),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Bug::Ant => 'A',
            Bug::Beetle => 'B',
            Bug::Grasshopper => 'G',
            Bug::Queen => 'Q',
            Bug::Spider => 'S',
            Bug::Mosquito => 'M',
            Bug::Ladybug => 'L',
            Bug::Pillbug => 'P',
        }
    }

    /// Bugs with more than one copy per side carry an ordinal (`wA2`)
    pub fn is_numbered(self) -> bool {
        matches!(self, Bug::Ant | Bug::Beetle | Bug::Grasshopper | Bug::Spider)
    }

    /// Number of copies each side owns
    pub fn count(self) -> u8 {
        match self {
            Bug::Ant | Bug::Grasshopper => 3,
            Bug::Beetle | Bug::Spider => 2,
            Bug::Queen | Bug::Mosquito | Bug::Ladybug | Bug::Pillbug => 1,
        }
    }

    pub fn is_expansion(self) -> bool {
        matches!(self, Bug::Mosquito | Bug::Ladybug | Bug::Pillbug)
    }
}

/// A single piece as written in UHP, e.g. `wA2` or `bQ`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceToken {
    pub owner: Side,
    pub bug: Bug,
    pub ordinal: Option<u8>,
}

impl PieceToken {
    pub fn new(owner: Side, bug: Bug, ordinal: Option<u8>) -> Self {
        Self { owner, bug, ordinal }
    }
}

impl fmt::Display for PieceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.owner.prefix(), self.bug.letter())?;
        if let Some(n) = self.ordinal {
            write!(f, "{}", n)?;
        }
        Ok(())
    }
}

impl FromStr for PieceToken {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let owner = match chars.next().ok_or(NotationError::Empty)? {
            'w' => Side::White,
            'b' => Side::Black,
            c => return Err(NotationError::UnknownSide(c.to_string())),
        };
        let letter = chars
            .next()
            .ok_or_else(|| NotationError::BadMove(s.to_string()))?;
        let bug = Bug::from_letter(letter).ok_or(NotationError::UnknownBug(letter))?;
        let rest = chars.as_str();

        let ordinal = if bug.is_numbered() {
            let n: u8 = rest
                .parse()
                .map_err(|_| NotationError::BadOrdinal(s.to_string()))?;
            if n == 0 || n > bug.count() || rest.len() != 1 {
                return Err(NotationError::BadOrdinal(s.to_string()));
            }
            Some(n)
        } else if rest.is_empty() {
            None
        } else {
            return Err(NotationError::BadOrdinal(s.to_string()));
        };

        Ok(PieceToken { owner, bug, ordinal })
    }
}

// ============================================================================
// MOVE STRINGS
// ============================================================================

/// Neighbour direction relative to an anchor piece
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    East,
    NorthEast,
    SouthEast,
    West,
    NorthWest,
    SouthWest,
}

impl Direction {
    fn symbol(self) -> char {
        match self {
            Direction::East | Direction::West => '-',
            Direction::NorthEast | Direction::SouthWest => '/',
            Direction::SouthEast | Direction::NorthWest => '\\',
        }
    }

    /// West-side directions put the symbol before the anchor piece
    fn is_prefix(self) -> bool {
        matches!(
            self,
            Direction::West | Direction::NorthWest | Direction::SouthWest
        )
    }

    fn prefixed(symbol: char) -> Option<Direction> {
        match symbol {
            '-' => Some(Direction::West),
            '/' => Some(Direction::SouthWest),
            '\\' => Some(Direction::NorthWest),
            _ => None,
        }
    }

    fn suffixed(symbol: char) -> Option<Direction> {
        match symbol {
            '-' => Some(Direction::East),
            '/' => Some(Direction::NorthEast),
            '\\' => Some(Direction::SouthEast),
            _ => None,
        }
    }
}

/// Where a moved or placed piece lands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Anchor {
    OnTop(PieceToken),
    Beside {
        piece: PieceToken,
        direction: Direction,
    },
}

impl Anchor {
    pub fn piece(&self) -> PieceToken {
        match self {
            Anchor::OnTop(piece) => *piece,
            Anchor::Beside { piece, .. } => *piece,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::OnTop(piece) => write!(f, "{}", piece),
            Anchor::Beside { piece, direction } if direction.is_prefix() => {
                write!(f, "{}{}", direction.symbol(), piece)
            }
            Anchor::Beside { piece, direction } => write!(f, "{}{}", piece, direction.symbol()),
        }
    }
}

impl FromStr for Anchor {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let first = s.chars().next().ok_or(NotationError::Empty)?;
        if let Some(direction) = Direction::prefixed(first) {
            let piece = s[first.len_utf8()..].parse()?;
            return Ok(Anchor::Beside { piece, direction });
        }

        let last = s.chars().last().ok_or(NotationError::Empty)?;
        if let Some(direction) = Direction::suffixed(last) {
            let piece = s[..s.len() - last.len_utf8()].parse()?;
            return Ok(Anchor::Beside { piece, direction });
        }

        Ok(Anchor::OnTop(s.parse()?))
    }
}

/// A parsed UHP move string. The `Display` form is the canonical encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MoveString {
    Pass,
    Piece {
        piece: PieceToken,
        anchor: Option<Anchor>,
    },
}

impl MoveString {
    pub fn is_pass(&self) -> bool {
        matches!(self, MoveString::Pass)
    }

    /// The piece being placed or moved (`None` for a pass)
    pub fn piece(&self) -> Option<PieceToken> {
        match self {
            MoveString::Pass => None,
            MoveString::Piece { piece, .. } => Some(*piece),
        }
    }

    pub fn anchor(&self) -> Option<Anchor> {
        match self {
            MoveString::Pass => None,
            MoveString::Piece { anchor, .. } => *anchor,
        }
    }
}

impl fmt::Display for MoveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveString::Pass => write!(f, "pass"),
            MoveString::Piece { piece, anchor: None } => write!(f, "{}", piece),
            MoveString::Piece {
                piece,
                anchor: Some(anchor),
            } => write!(f, "{} {}", piece, anchor),
        }
    }
}

impl FromStr for MoveString {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(NotationError::Empty);
        }
        if trimmed == "pass" {
            return Ok(MoveString::Pass);
        }

        let mut tokens = trimmed.split_whitespace();
        let piece: PieceToken = tokens
            .next()
            .ok_or(NotationError::Empty)?
            .parse()
            .map_err(|_| NotationError::BadMove(trimmed.to_string()))?;
        let anchor = match tokens.next() {
            Some(token) => Some(
                token
                    .parse::<Anchor>()
                    .map_err(|_| NotationError::BadMove(trimmed.to_string()))?,
            ),
            None => None,
        };
        if tokens.next().is_some() {
            return Err(NotationError::BadMove(trimmed.to_string()));
        }
        if anchor.map(|a| a.piece() == piece).unwrap_or(false) {
            return Err(NotationError::BadMove(trimmed.to_string()));
        }

        Ok(MoveString::Piece { piece, anchor })
    }
}

impl TryFrom<String> for MoveString {
    type Error = NotationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MoveString> for String {
    fn from(value: MoveString) -> Self {
        value.to_string()
    }
}
