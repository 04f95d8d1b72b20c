//! Matchmaking scheduler
//!
//! Level 3 - Game arbitration
//!
//! Periodic pairing passes over the ticket queue. Passes never overlap,
//! and a pairing's tickets become Matched under the same queue lock that
//! registers its session, so a Matched ticket always has a session.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roach_core::ParticipantId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ColorPolicy, MatchmakingConfig};
use crate::error::MatchmakingError;
use crate::participant::{Participant, Roster};
use crate::session::{GameSession, SessionContext, SessionHandle};
use crate::tickets::{Opponent, PairingPolicy, Ticket, TicketId, TicketQueue, TicketStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decides who plays white
pub struct ColorPicker {
    policy: ColorPolicy,
    flip: bool,
    rng: ChaCha8Rng,
}

impl ColorPicker {
    pub fn new(policy: ColorPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            policy,
            flip: false,
            rng,
        }
    }

    /// Order `(first, second)` as `(white, black)`
    pub fn assign<T>(&mut self, first: T, second: T) -> (T, T) {
        let swap = match self.policy {
            ColorPolicy::Alternate => {
                let swap = self.flip;
                self.flip = !self.flip;
                swap
            }
            ColorPolicy::Random => self.rng.gen_bool(0.5),
        };
        if swap {
            (second, first)
        } else {
            (first, second)
        }
    }
}

pub struct Scheduler {
    queue: Mutex<TicketQueue>,
    colors: Mutex<ColorPicker>,
    pass_lock: tokio::sync::Mutex<()>,
    roster: Arc<Roster>,
    context: SessionContext,
    interval: Duration,
}

impl Scheduler {
    pub fn new(roster: Arc<Roster>, context: SessionContext, config: &MatchmakingConfig) -> Self {
        let policy = PairingPolicy::from_config(config, roster.fallback());
        Self {
            queue: Mutex::new(TicketQueue::new(policy)),
            colors: Mutex::new(ColorPicker::new(config.color_policy, config.seed)),
            pass_lock: tokio::sync::Mutex::new(()),
            roster,
            context,
            interval: config.interval(),
        }
    }

    /// Queue a participant at its current stored rating
    pub async fn enqueue(&self, participant: ParticipantId) -> Result<Ticket, MatchmakingError> {
        if self.roster.get(participant).is_none() {
            return Err(MatchmakingError::UnknownParticipant(participant));
        }
        let rating = self.context.repository.load_rating(participant).await?;
        let ticket = lock(&self.queue).enqueue(participant, rating, Instant::now())?;
        info!("{} queued {} at rating {}", participant, ticket.id, rating);
        Ok(ticket)
    }

    pub fn cancel(&self, id: TicketId) -> Result<TicketStatus, MatchmakingError> {
        let status = lock(&self.queue).cancel(id)?;
        debug!("cancel {}: now {:?}", id, status);
        Ok(status)
    }

    pub fn poll(&self, id: TicketId) -> Result<TicketStatus, MatchmakingError> {
        lock(&self.queue).poll(id)
    }

    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        lock(&self.queue).get(id).cloned()
    }

    pub fn waiting(&self) -> usize {
        lock(&self.queue).waiting().len()
    }

    /// One pairing pass; returns the sessions it started
    pub async fn run_pass(&self) -> Vec<SessionHandle> {
        let _pass = self.pass_lock.lock().await;
        let now = Instant::now();

        let mut queue = lock(&self.queue);
        let mut started = Vec::new();
        for pairing in queue.pairing_pass(now) {
            let (a, b) = pairing.participants();
            let (Some(a), Some(b)) = (self.participant(a), self.participant(b)) else {
                warn!("Skipping pairing with unregistered participant ({} vs {})", a, b);
                continue;
            };
            if let Opponent::Fallback(_) = pairing.opponent {
                info!("{} waited {:?}; pairing with fallback", pairing.first.id, pairing.first.waited(now));
            }

            let (white, black) = lock(&self.colors).assign(a, b);
            let id = self.context.registry.allocate_id();
            for ticket in pairing.tickets() {
                queue.mark_matched(ticket, id);
            }
            info!("Paired {} (white) with {} (black) as {}", white.name, black.name, id);
            started.push(GameSession::spawn_with_id(self.context.clone(), id, white, black));
        }
        started
    }

    fn participant(&self, id: ParticipantId) -> Option<Participant> {
        self.roster.get(id).cloned()
    }

    /// Run passes every interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduler running every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pass().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }
}
