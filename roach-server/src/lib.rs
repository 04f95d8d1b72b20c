//! Roach Server - HTTP API over a running arena
//!
//! This crate provides the web surface:
//! - Participant listing, results and arena status
//! - Matchmaking tickets (enqueue, poll, cancel)
//! - Live session snapshots and forfeits
//! - Completed game records, listed or by id

mod error;
mod routes;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use roach_relay::Arena;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use error::ApiError;
pub use state::ServerState;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Create the router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/status", get(routes::status::status_handler))
        .route("/api/participants", get(routes::participants::list_participants))
        .route("/api/participants/:id", get(routes::participants::get_participant))
        // Matchmaking
        .route("/api/tickets", post(routes::tickets::create_ticket))
        .route(
            "/api/tickets/:id",
            get(routes::tickets::get_ticket).delete(routes::tickets::cancel_ticket),
        )
        // Live sessions
        .route("/api/sessions", get(routes::sessions::list_sessions))
        .route("/api/sessions/:id", get(routes::sessions::get_session))
        .route("/api/sessions/:id/forfeit", post(routes::sessions::forfeit_session))
        // Archive
        .route("/api/games", get(routes::games::list_games))
        .route("/api/games/:id", get(routes::games::get_game))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serve the API for `arena` until `shutdown` resolves
pub async fn run_server<F>(config: ServerConfig, arena: Arc<Arena>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let router = create_router(Arc::new(ServerState::new(arena)));

    tracing::info!("Roach server starting on http://0.0.0.0:{}", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

    tracing::info!("Roach server stopped");
    Ok(())
}
