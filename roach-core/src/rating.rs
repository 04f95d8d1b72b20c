//! Elo rating exchange
//!
//! Pure functions only. Applying the result to stored ratings is the
//! relay's `RatingService`.

use serde::{Deserialize, Serialize};

use crate::notation::Side;
use crate::record::Outcome;

pub type Rating = i32;

/// Rating given to newly registered participants
pub const INITIAL_RATING: Rating = 1500;

/// Default sensitivity constant
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Rating change for both sides of one game. Always sums to zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub white: i32,
    pub black: i32,
}

impl RatingDelta {
    pub fn for_side(&self, side: Side) -> i32 {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }
}

/// Expected score of `rating` against `opponent` (logistic, 400-point scale)
pub fn expected_score(rating: Rating, opponent: Rating) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
}

/// Compute the zero-sum exchange for a finished game.
///
/// Faults score exactly like decisive results. White's delta is rounded
/// and black receives its negation, so nothing is created or lost.
pub fn exchange(white: Rating, black: Rating, outcome: &Outcome, k: f64) -> RatingDelta {
    let expected = expected_score(white, black);
    let actual = outcome.score_for(Side::White);
    let delta = (k * (actual - expected)).round() as i32;

    RatingDelta {
        white: delta,
        black: -delta,
    }
}
