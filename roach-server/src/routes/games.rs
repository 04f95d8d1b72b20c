//! Completed game records

use axum::{
    extract::{Path, State},
    Json,
};
use roach_core::{GameRecord, SessionId};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::ServerState;

pub async fn list_games(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<GameRecord>>, ApiError> {
    Ok(Json(state.arena.repository.completed_games().await?))
}

pub async fn get_game(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u64>,
) -> Result<Json<GameRecord>, ApiError> {
    let id = SessionId(id);
    state
        .arena
        .repository
        .completed_games()
        .await?
        .into_iter()
        .find(|record| record.id == id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no completed game {}", id)))
}
