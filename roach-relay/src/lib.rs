//! Roach Relay - Game-session relay, matchmaking and ratings
//!
//! This crate is the arena's engine room:
//! - Line transports to participant engines (process pipes, TCP)
//! - Protocol adapters for the UHP and Line dialects
//! - The per-game session state machine and its spectator feed
//! - The live session registry
//! - Ticket queue and periodic pairing scheduler
//! - Atomic rating updates over a repository seam
//! - Per-participant results from the game archive
//!
//! Layering, bottom up:
//! - Level 1: `transport`, `participant`, `repository`
//! - Level 2: `adapter`, `tickets`
//! - Level 3: `referee`, `session`, `registry`, `scheduler`, `ratings`, `stats`
//! - Level 4: `config`, `arena`

pub mod adapter;
pub mod arena;
pub mod config;
pub mod error;
pub mod participant;
pub mod ratings;
pub mod referee;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod tickets;
pub mod transport;

// Re-exports for convenient access
pub use adapter::{Dialect, ProtocolAdapter, Query, Reply};
pub use arena::Arena;
pub use config::{
    ArenaConfig, ColorPolicy, EngineConfig, MatchmakingConfig, ParticipantConfig, RatingConfig, SessionConfig,
    TimeControl,
};
pub use error::{AdapterError, ConnectError, MatchmakingError, Rejection, RepositoryError, TransportError};
pub use participant::{connector_for, Connector, Participant, ParticipantInfo, ProcessConnector, Roster, TcpConnector};
pub use ratings::RatingService;
pub use referee::{Referee, SessionState};
pub use registry::{RegistryEvent, SessionRegistry};
pub use repository::{InMemoryRepository, RatingChange, RatingUpdate, Repository};
pub use scheduler::{ColorPicker, Scheduler};
pub use session::{Control, GameSession, SessionContext, SessionHandle, SessionSnapshot, SpectatorEvent};
pub use stats::ParticipantStats;
pub use tickets::{Opponent, Pairing, PairingPolicy, Ticket, TicketId, TicketQueue, TicketStatus};
pub use transport::{LineChannel, Transport};
