//! Applying rating exchanges
//!
//! Level 3 - Game arbitration

use roach_core::{exchange, Outcome, ParticipantId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RatingConfig;
use crate::error::RepositoryError;
use crate::repository::{RatingChange, RatingUpdate, Repository};

/// Loads both ratings, computes the exchange and commits it atomically,
/// retrying from fresh ratings when another game got there first.
#[derive(Clone)]
pub struct RatingService {
    repository: Arc<dyn Repository>,
    k_factor: f64,
    max_attempts: u32,
}

impl RatingService {
    pub fn new(repository: Arc<dyn Repository>, config: &RatingConfig) -> Self {
        Self {
            repository,
            k_factor: config.k_factor,
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub async fn apply(
        &self,
        white: ParticipantId,
        black: ParticipantId,
        outcome: &Outcome,
    ) -> Result<RatingUpdate, RepositoryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let white_before = self.repository.load_rating(white).await?;
            let black_before = self.repository.load_rating(black).await?;
            let delta = exchange(white_before, black_before, outcome, self.k_factor);

            let update = RatingUpdate {
                white: RatingChange {
                    participant: white,
                    before: white_before,
                    after: white_before + delta.white,
                },
                black: RatingChange {
                    participant: black,
                    before: black_before,
                    after: black_before + delta.black,
                },
            };

            match self.repository.save_ratings(&update).await {
                Ok(()) => {
                    info!(
                        "Ratings: {} {} -> {}, {} {} -> {}",
                        white, white_before, update.white.after, black, black_before, update.black.after
                    );
                    return Ok(update);
                }
                Err(RepositoryError::RatingUpdateConflict) if attempt < self.max_attempts => {
                    debug!("Rating conflict for {} vs {}, retrying ({})", white, black, attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
