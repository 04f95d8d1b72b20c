//! Matchmaking tickets
//!
//! Level 2 - Pairing
//!
//! `TicketQueue` is synchronous and takes the current instant as an
//! argument, so pairing decisions are plain functions of queue state
//! and time. The `Scheduler` wraps it with locking and a timer.

use roach_core::{ParticipantId, Rating, SessionId};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::MatchmakingConfig;
use crate::error::MatchmakingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "session", rename_all = "snake_case")]
pub enum TicketStatus {
    Waiting,
    Matched(SessionId),
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: TicketId,
    pub participant: ParticipantId,
    /// Rating when the ticket was enqueued; later changes do not apply
    pub rating: Rating,
    pub enqueued_at: Instant,
    pub status: TicketStatus,
}

impl Ticket {
    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }
}

/// Who the oldest ticket of a pairing plays against
#[derive(Clone, Debug)]
pub enum Opponent {
    Ticket(Ticket),
    Fallback(ParticipantId),
}

/// A planned match. `first` is always the older ticket.
#[derive(Clone, Debug)]
pub struct Pairing {
    pub first: Ticket,
    pub opponent: Opponent,
}

impl Pairing {
    pub fn participants(&self) -> (ParticipantId, ParticipantId) {
        let other = match &self.opponent {
            Opponent::Ticket(ticket) => ticket.participant,
            Opponent::Fallback(participant) => *participant,
        };
        (self.first.participant, other)
    }

    pub fn tickets(&self) -> Vec<TicketId> {
        match &self.opponent {
            Opponent::Ticket(ticket) => vec![self.first.id, ticket.id],
            Opponent::Fallback(_) => vec![self.first.id],
        }
    }
}

/// Tolerance window and starvation policy
#[derive(Clone, Debug)]
pub struct PairingPolicy {
    pub base_tolerance: u32,
    pub widen_per_sec: f64,
    pub max_tolerance: Option<u32>,
    pub fallback_after: Option<Duration>,
    pub fallback: Option<ParticipantId>,
}

impl PairingPolicy {
    pub fn from_config(config: &MatchmakingConfig, fallback: Option<ParticipantId>) -> Self {
        Self {
            base_tolerance: config.base_tolerance,
            widen_per_sec: config.widen_per_sec,
            max_tolerance: config.max_tolerance,
            fallback_after: config.fallback_after(),
            fallback,
        }
    }

    /// Rating window after waiting `waited`: grows linearly, optionally capped
    pub fn tolerance(&self, waited: Duration) -> u32 {
        let widened = self.base_tolerance as f64 + self.widen_per_sec * waited.as_secs_f64();
        let window = widened.min(u32::MAX as f64) as u32;
        match self.max_tolerance {
            Some(cap) => window.min(cap),
            None => window,
        }
    }
}

pub struct TicketQueue {
    tickets: FxHashMap<TicketId, Ticket>,
    next_id: u64,
    policy: PairingPolicy,
}

impl TicketQueue {
    pub fn new(policy: PairingPolicy) -> Self {
        Self {
            tickets: FxHashMap::default(),
            next_id: 0,
            policy,
        }
    }

    pub fn policy(&self) -> &PairingPolicy {
        &self.policy
    }

    /// Queue a participant with its current rating
    pub fn enqueue(&mut self, participant: ParticipantId, rating: Rating, now: Instant) -> Result<Ticket, MatchmakingError> {
        let queued = self
            .tickets
            .values()
            .any(|t| t.participant == participant && t.status == TicketStatus::Waiting);
        if queued {
            return Err(MatchmakingError::AlreadyQueued(participant));
        }

        self.next_id += 1;
        let ticket = Ticket {
            id: TicketId(self.next_id),
            participant,
            rating,
            enqueued_at: now,
            status: TicketStatus::Waiting,
        };
        self.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    /// Cancel a waiting ticket. Matched and cancelled tickets are left as they are.
    pub fn cancel(&mut self, id: TicketId) -> Result<TicketStatus, MatchmakingError> {
        let ticket = self
            .tickets
            .get_mut(&id)
            .ok_or(MatchmakingError::UnknownTicket(id))?;
        if ticket.status == TicketStatus::Waiting {
            ticket.status = TicketStatus::Cancelled;
        }
        Ok(ticket.status)
    }

    pub fn poll(&self, id: TicketId) -> Result<TicketStatus, MatchmakingError> {
        self.tickets
            .get(&id)
            .map(|t| t.status)
            .ok_or(MatchmakingError::UnknownTicket(id))
    }

    pub fn get(&self, id: TicketId) -> Option<&Ticket> {
        self.tickets.get(&id)
    }

    /// Waiting tickets, oldest first
    pub fn waiting(&self) -> Vec<&Ticket> {
        let mut waiting: Vec<_> = self
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Waiting)
            .collect();
        waiting.sort_by_key(|t| (t.enqueued_at, t.id));
        waiting
    }

    /// Plan this pass's pairings without changing any ticket.
    ///
    /// Oldest first: each unpaired ticket takes the nearest-rated unpaired
    /// ticket inside its tolerance window (older wins ties). A ticket that
    /// finds nobody and has waited past `fallback_after` plays the fallback.
    pub fn pairing_pass(&self, now: Instant) -> Vec<Pairing> {
        let waiting = self.waiting();
        let mut taken = FxHashSet::default();
        let mut pairings = Vec::new();

        for ticket in &waiting {
            if taken.contains(&ticket.id) {
                continue;
            }
            let waited = ticket.waited(now);
            let window = self.policy.tolerance(waited);

            let nearest = waiting
                .iter()
                .filter(|c| c.id != ticket.id && c.participant != ticket.participant && !taken.contains(&c.id))
                .map(|c| ((c.rating - ticket.rating).unsigned_abs(), *c))
                .filter(|(gap, _)| *gap <= window)
                .min_by_key(|(gap, c)| (*gap, c.enqueued_at, c.id));

            if let Some((_, other)) = nearest {
                taken.insert(ticket.id);
                taken.insert(other.id);
                pairings.push(Pairing {
                    first: (*ticket).clone(),
                    opponent: Opponent::Ticket(other.clone()),
                });
                continue;
            }

            let starving = self.policy.fallback_after.is_some_and(|after| waited >= after);
            match self.policy.fallback {
                Some(fallback) if starving && fallback != ticket.participant => {
                    taken.insert(ticket.id);
                    pairings.push(Pairing {
                        first: (*ticket).clone(),
                        opponent: Opponent::Fallback(fallback),
                    });
                }
                _ => {}
            }
        }
        pairings
    }

    /// Waiting -> Matched. False if the ticket was not waiting.
    pub fn mark_matched(&mut self, id: TicketId, session: SessionId) -> bool {
        match self.tickets.get_mut(&id) {
            Some(ticket) if ticket.status == TicketStatus::Waiting => {
                ticket.status = TicketStatus::Matched(session);
                true
            }
            _ => false,
        }
    }
}
