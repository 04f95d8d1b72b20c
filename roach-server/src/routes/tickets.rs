//! Matchmaking ticket endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use roach_core::{ParticipantId, Rating};
use roach_relay::{MatchmakingError, Ticket, TicketId, TicketStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::ApiError;
use crate::state::ServerState;

#[derive(Deserialize)]
pub struct TicketRequest {
    pub participant: ParticipantId,
}

#[derive(Serialize)]
pub struct TicketView {
    pub id: TicketId,
    pub participant: ParticipantId,
    pub rating: Rating,
    pub waited_ms: u64,
    #[serde(flatten)]
    pub status: TicketStatus,
}

impl TicketView {
    fn of(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            participant: ticket.participant,
            rating: ticket.rating,
            waited_ms: ticket.waited(Instant::now()).as_millis() as u64,
            status: ticket.status,
        }
    }
}

fn find(state: &ServerState, id: TicketId) -> Result<Ticket, ApiError> {
    state
        .arena
        .scheduler
        .ticket(id)
        .ok_or_else(|| MatchmakingError::UnknownTicket(id).into())
}

/// Queue a participant for matchmaking
pub async fn create_ticket(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<TicketRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TicketView>), ApiError> {
    let Json(request) = body?;
    let ticket = state.arena.scheduler.enqueue(request.participant).await?;
    Ok((StatusCode::CREATED, Json(TicketView::of(&ticket))))
}

pub async fn get_ticket(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u64>,
) -> Result<Json<TicketView>, ApiError> {
    let ticket = find(&state, TicketId(id))?;
    Ok(Json(TicketView::of(&ticket)))
}

/// Cancel a waiting ticket. A matched ticket is returned unchanged.
pub async fn cancel_ticket(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<u64>,
) -> Result<Json<TicketView>, ApiError> {
    let id = TicketId(id);
    state.arena.scheduler.cancel(id)?;
    let ticket = find(&state, id)?;
    Ok(Json(TicketView::of(&ticket)))
}
