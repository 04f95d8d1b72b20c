//! Status endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::ServerState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub participants: usize,
    pub live_sessions: usize,
    pub waiting_tickets: usize,
}

pub async fn status_handler(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let arena = &state.arena;
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        participants: arena.roster.len(),
        live_sessions: arena.registry.len(),
        waiting_tickets: arena.scheduler.waiting(),
    })
}
