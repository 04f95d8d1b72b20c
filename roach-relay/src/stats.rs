//! Participant results
//!
//! Level 3 - Derived from the game archive
//!
//! Nothing here is stored: counts are recomputed from completed records
//! whenever they are asked for.

use roach_core::{GameRecord, Outcome, ParticipantId, Side};
use serde::Serialize;

/// Result counts over a participant's finished games.
///
/// The categories are disjoint, so a game the opponent lost by fault is a
/// fault win and not also a win, and `games` is the sum of the rest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParticipantStats {
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub fault_wins: u32,
    pub fault_losses: u32,
}

impl ParticipantStats {
    pub fn tally<'a>(participant: ParticipantId, records: impl IntoIterator<Item = &'a GameRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.count(participant, record);
        }
        stats
    }

    /// Count one game. Unfinished games and games `participant` did not
    /// play leave the counts alone.
    pub fn count(&mut self, participant: ParticipantId, record: &GameRecord) {
        let Some(side) = side_of(participant, record) else {
            return;
        };
        let Some(outcome) = record.outcome() else {
            return;
        };

        match outcome {
            Outcome::Draw => self.draws += 1,
            Outcome::Win { winner } if winner == side => self.wins += 1,
            Outcome::Win { .. } => self.losses += 1,
            Outcome::Fault { side: faulted, .. } if faulted == side => self.fault_losses += 1,
            Outcome::Fault { .. } => self.fault_wins += 1,
        }
        self.games += 1;
    }

    /// Share of points scored, draws counting half
    pub fn score(&self) -> Option<f64> {
        if self.games == 0 {
            return None;
        }
        let points = (self.wins + self.fault_wins) as f64 + self.draws as f64 * 0.5;
        Some(points / self.games as f64)
    }
}

fn side_of(participant: ParticipantId, record: &GameRecord) -> Option<Side> {
    Side::BOTH
        .into_iter()
        .find(|&side| record.participant(side) == participant)
}
