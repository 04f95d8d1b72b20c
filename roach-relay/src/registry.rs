//! Live session table
//!
//! Level 3 - Game arbitration

use chrono::{DateTime, Utc};
use roach_core::{Outcome, ParticipantId, SessionId};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify};
use tracing::debug;

use crate::session::SessionHandle;

const EVENT_BUFFER: usize = 256;

/// Session lifecycle notifications
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered {
        session: SessionId,
        white: ParticipantId,
        black: ParticipantId,
        started_at: DateTime<Utc>,
    },
    Retired {
        session: SessionId,
        outcome: Outcome,
    },
}

/// Sessions that are running, plus a count of retired ones whose record
/// has not been stored yet. Each operation holds the lock briefly.
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<SessionId, SessionHandle>>,
    next_id: AtomicU64,
    archiving: AtomicUsize,
    events: broadcast::Sender<RegistryEvent>,
    idle: Notify,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sessions: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            archiving: AtomicUsize::new(0),
            events,
            idle: Notify::new(),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, FxHashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allocate_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, handle: SessionHandle) {
        let event = RegistryEvent::Registered {
            session: handle.id,
            white: handle.white,
            black: handle.black,
            started_at: handle.started_at,
        };
        self.sessions().insert(handle.id, handle);
        let _ = self.events.send(event);
    }

    /// Remove a finished session. Its record counts as pending until `archived`.
    pub fn retire(&self, id: SessionId, outcome: Outcome) -> Option<SessionHandle> {
        let removed = {
            let mut sessions = self.sessions();
            let removed = sessions.remove(&id);
            if removed.is_some() {
                self.archiving.fetch_add(1, Ordering::SeqCst);
            }
            removed
        };
        if removed.is_some() {
            debug!("Retired {}", id);
            let _ = self.events.send(RegistryEvent::Retired { session: id, outcome });
        }
        removed
    }

    /// A retired session's record has been handed off
    pub fn archived(&self) {
        let _ = self
            .archiving
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.wake_if_idle();
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions().get(&id).cloned()
    }

    /// Live sessions ordered by id
    pub fn list(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<_> = self.sessions().values().cloned().collect();
        handles.sort_by_key(|h| h.id);
        handles
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn is_idle(&self) -> bool {
        self.is_empty() && self.archiving.load(Ordering::SeqCst) == 0
    }

    fn wake_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    /// Wait until no session is running and every record is stored
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}
