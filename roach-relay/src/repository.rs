//! Persistence seam
//!
//! Level 1 - Collaborator interfaces
//!
//! The arena stores ratings and completed games through `Repository`.
//! `save_ratings` is a compare-and-swap over both participants so a
//! rating exchange is applied whole or not at all.

use async_trait::async_trait;
use roach_core::{GameRecord, ParticipantId, Rating};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::RepositoryError;
use crate::participant::Roster;

/// One participant's side of a rating exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RatingChange {
    pub participant: ParticipantId,
    pub before: Rating,
    pub after: Rating,
}

impl RatingChange {
    pub fn delta(&self) -> i32 {
        self.after - self.before
    }
}

/// Both halves of a zero-sum exchange, committed together
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RatingUpdate {
    pub white: RatingChange,
    pub black: RatingChange,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_rating(&self, participant: ParticipantId) -> Result<Rating, RepositoryError>;

    /// Write both new ratings if both stored ratings still equal `before`.
    /// Otherwise nothing is written and `RatingUpdateConflict` is returned.
    async fn save_ratings(&self, update: &RatingUpdate) -> Result<(), RepositoryError>;

    async fn save_completed_game(&self, record: &GameRecord) -> Result<(), RepositoryError>;

    /// Completed games, oldest first
    async fn completed_games(&self) -> Result<Vec<GameRecord>, RepositoryError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local repository
#[derive(Default)]
pub struct InMemoryRepository {
    ratings: Mutex<FxHashMap<ParticipantId, Rating>>,
    games: Mutex<Vec<GameRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository holding every roster participant's starting rating
    pub fn seeded(roster: &Roster) -> Self {
        let repository = Self::new();
        for participant in roster.list() {
            repository.set_rating(participant.id, participant.initial_rating);
        }
        repository
    }

    pub fn set_rating(&self, participant: ParticipantId, rating: Rating) {
        lock(&self.ratings).insert(participant, rating);
    }

    pub fn rating(&self, participant: ParticipantId) -> Option<Rating> {
        lock(&self.ratings).get(&participant).copied()
    }

    pub fn game_count(&self) -> usize {
        lock(&self.games).len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn load_rating(&self, participant: ParticipantId) -> Result<Rating, RepositoryError> {
        self.rating(participant)
            .ok_or(RepositoryError::NotFound(participant))
    }

    async fn save_ratings(&self, update: &RatingUpdate) -> Result<(), RepositoryError> {
        let mut ratings = lock(&self.ratings);
        for change in [update.white, update.black] {
            let current = ratings
                .get(&change.participant)
                .copied()
                .ok_or(RepositoryError::NotFound(change.participant))?;
            if current != change.before {
                return Err(RepositoryError::RatingUpdateConflict);
            }
        }
        ratings.insert(update.white.participant, update.white.after);
        ratings.insert(update.black.participant, update.black.after);
        Ok(())
    }

    async fn save_completed_game(&self, record: &GameRecord) -> Result<(), RepositoryError> {
        if !record.is_finished() {
            return Err(RepositoryError::Storage(format!("{} has no outcome", record.id)));
        }
        lock(&self.games).push(record.clone());
        Ok(())
    }

    async fn completed_games(&self) -> Result<Vec<GameRecord>, RepositoryError> {
        Ok(lock(&self.games).clone())
    }
}
