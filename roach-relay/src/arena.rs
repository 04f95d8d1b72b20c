//! Arena wiring
//!
//! Level 4 - Service assembly
//!
//! Builds the shared services (roster, registry, repository, ratings,
//! scheduler) once at startup and owns their shutdown.

use roach_core::{ParticipantId, RulesValidator};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ArenaConfig;
use crate::error::MatchmakingError;
use crate::participant::Roster;
use crate::ratings::RatingService;
use crate::registry::SessionRegistry;
use crate::repository::Repository;
use crate::scheduler::Scheduler;
use crate::session::{GameSession, SessionContext, SessionHandle};

pub struct Arena {
    pub config: ArenaConfig,
    pub roster: Arc<Roster>,
    pub registry: Arc<SessionRegistry>,
    pub repository: Arc<dyn Repository>,
    pub scheduler: Arc<Scheduler>,
    context: SessionContext,
    shutdown: watch::Sender<bool>,
}

impl Arena {
    pub fn new(
        config: ArenaConfig,
        roster: Roster,
        rules: Arc<dyn RulesValidator>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        let roster = Arc::new(roster);
        let registry = Arc::new(SessionRegistry::new());
        let context = SessionContext {
            rules,
            repository: repository.clone(),
            ratings: RatingService::new(repository.clone(), &config.rating),
            registry: registry.clone(),
            session: config.session.clone(),
            time_control: config.time_control,
        };
        let scheduler = Arc::new(Scheduler::new(roster.clone(), context.clone(), &config.matchmaking));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            roster,
            registry,
            repository,
            scheduler,
            context,
            shutdown,
        }
    }

    /// Start a game between two registered participants directly
    pub fn start_session(&self, white: ParticipantId, black: ParticipantId) -> Result<SessionHandle, MatchmakingError> {
        let white = self
            .roster
            .get(white)
            .cloned()
            .ok_or(MatchmakingError::UnknownParticipant(white))?;
        let black = self
            .roster
            .get(black)
            .cloned()
            .ok_or(MatchmakingError::UnknownParticipant(black))?;
        Ok(GameSession::spawn(self.context.clone(), white, black))
    }

    /// Run the pairing loop in the background until `shutdown`
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        let stop = self.shutdown.subscribe();
        tokio::spawn(async move { scheduler.run(stop).await })
    }

    /// Stop pairing, then wait for running games to finish and be stored
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let live = self.registry.len();
        if live > 0 {
            info!("Waiting for {} session(s) to finish", live);
        }
        self.registry.drain().await;
        info!("Arena drained");
    }
}
