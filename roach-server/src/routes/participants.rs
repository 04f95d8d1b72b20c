//! Participant listing and results

use axum::{
    extract::{Path, State},
    Json,
};
use roach_core::{ParticipantId, Rating, SessionId};
use roach_relay::{ParticipantInfo, ParticipantStats};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::ServerState;

#[derive(Serialize)]
pub struct ParticipantView {
    #[serde(flatten)]
    pub info: ParticipantInfo,
    pub rating: Rating,
}

#[derive(Serialize)]
pub struct ParticipantDetail {
    #[serde(flatten)]
    pub info: ParticipantInfo,
    pub rating: Rating,
    pub stats: ParticipantStats,
    /// Completed games, in archive order
    pub games: Vec<SessionId>,
}

/// Every registered participant with its stored rating, by id
pub async fn list_participants(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<ParticipantView>>, ApiError> {
    let arena = &state.arena;
    let mut views = Vec::with_capacity(arena.roster.len());
    for participant in arena.roster.list() {
        let rating = arena.repository.load_rating(participant.id).await?;
        views.push(ParticipantView {
            info: participant.into(),
            rating,
        });
    }
    Ok(Json(views))
}

/// One participant with its rating and results over the archive
pub async fn get_participant(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u32>,
) -> Result<Json<ParticipantDetail>, ApiError> {
    let arena = &state.arena;
    let id = ParticipantId(id);
    let info: ParticipantInfo = arena
        .roster
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("no participant {}", id)))?
        .into();

    let rating = arena.repository.load_rating(id).await?;
    let played: Vec<_> = arena
        .repository
        .completed_games()
        .await?
        .into_iter()
        .filter(|record| record.white == id || record.black == id)
        .collect();

    Ok(Json(ParticipantDetail {
        info,
        rating,
        stats: ParticipantStats::tally(id, &played),
        games: played.iter().map(|record| record.id).collect(),
    }))
}
