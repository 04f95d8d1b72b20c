//! Live session endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use roach_core::{ParticipantId, SessionId, Side};
use roach_relay::{SessionHandle, SessionSnapshot, SessionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::ServerState;

#[derive(Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub white: ParticipantId,
    pub black: ParticipantId,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    pub to_move: Side,
    pub plies: usize,
}

impl From<&SessionHandle> for SessionSummary {
    fn from(handle: &SessionHandle) -> Self {
        let snapshot = handle.snapshot();
        Self {
            id: handle.id,
            white: handle.white,
            black: handle.black,
            started_at: handle.started_at,
            state: snapshot.state,
            to_move: snapshot.to_move,
            plies: snapshot.record.plies().len(),
        }
    }
}

#[derive(Deserialize)]
pub struct ForfeitRequest {
    pub side: Side,
}

#[derive(Serialize)]
pub struct ForfeitResponse {
    pub session: SessionId,
    pub side: Side,
}

fn find(state: &ServerState, id: u64) -> Result<SessionHandle, ApiError> {
    let id = SessionId(id);
    state
        .arena
        .registry
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("no live session {}", id)))
}

pub async fn list_sessions(State(state): State<Arc<ServerState>>) -> Json<Vec<SessionSummary>> {
    let sessions = state.arena.registry.list();
    Json(sessions.iter().map(SessionSummary::from).collect())
}

pub async fn get_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(find(&state, id)?.snapshot()))
}

/// Ask a live session to end with `side` forfeiting
pub async fn forfeit_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u64>,
    body: Result<Json<ForfeitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ForfeitResponse>), ApiError> {
    let Json(request) = body?;
    let handle = find(&state, id)?;
    if handle.snapshot().state.is_terminal() || !handle.forfeit(request.side) {
        return Err(ApiError::Conflict(format!("{} has already finished", handle.id)));
    }
    tracing::info!("{} forfeit requested for {}", handle.id, request.side);
    Ok((
        StatusCode::ACCEPTED,
        Json(ForfeitResponse {
            session: handle.id,
            side: request.side,
        }),
    ))
}
