//! Participants and how to reach them
//!
//! Level 1 - Transport primitives
//!
//! A participant is an identity, a dialect and a `Connector` that opens a
//! fresh duplex channel for every session it plays.

use async_trait::async_trait;
use roach_core::{ParticipantId, Rating};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::adapter::Dialect;
use crate::config::{ArenaConfig, EngineConfig};
use crate::error::ConnectError;
use crate::transport::{LineChannel, Transport};

/// Opens a transport to one participant's engine
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError>;

    /// Human-readable endpoint, for logs and the API
    fn describe(&self) -> String;
}

/// Launches a local engine process per session
#[derive(Clone, Debug)]
pub struct ProcessConnector {
    pub command: String,
    pub args: Vec<String>,
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError> {
        let channel = LineChannel::spawn_process(&self.command, &self.args)?;
        Ok(Box::new(channel))
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Dials a remote agent per session
#[derive(Clone, Debug)]
pub struct TcpConnector {
    pub addr: String,
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError> {
        let channel = LineChannel::connect_tcp(&self.addr).await?;
        Ok(Box::new(channel))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

pub fn connector_for(engine: &EngineConfig) -> Arc<dyn Connector> {
    match engine {
        EngineConfig::Process { command, args } => Arc::new(ProcessConnector {
            command: command.clone(),
            args: args.clone(),
        }),
        EngineConfig::Tcp { addr } => Arc::new(TcpConnector { addr: addr.clone() }),
    }
}

#[derive(Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub dialect: Dialect,
    /// Rating seeded into the repository at registration
    pub initial_rating: Rating,
    connector: Arc<dyn Connector>,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        name: impl Into<String>,
        dialect: Dialect,
        initial_rating: Rating,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            dialect,
            initial_rating,
            connector,
        }
    }

    pub async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError> {
        self.connector.connect().await
    }

    pub fn endpoint(&self) -> String {
        self.connector.describe()
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

/// Public view of a participant
#[derive(Clone, Debug, Serialize)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub name: String,
    pub dialect: Dialect,
    pub endpoint: String,
}

impl From<&Participant> for ParticipantInfo {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            dialect: p.dialect,
            endpoint: p.endpoint(),
        }
    }
}

/// Registered participants, fixed once the arena starts
#[derive(Default)]
pub struct Roster {
    participants: FxHashMap<ParticipantId, Participant>,
    next_id: u32,
    fallback: Option<ParticipantId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration; ratings default to `rating.initial_rating`
    pub fn from_config(config: &ArenaConfig) -> Self {
        let mut roster = Self::new();
        for entry in &config.participants {
            let id = roster.register(
                entry.name.clone(),
                entry.dialect,
                entry.rating.unwrap_or(config.rating.initial_rating),
                connector_for(&entry.engine),
            );
            if config.fallback.as_deref() == Some(entry.name.as_str()) {
                roster.fallback = Some(id);
            }
        }
        roster
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        dialect: Dialect,
        rating: Rating,
        connector: Arc<dyn Connector>,
    ) -> ParticipantId {
        self.next_id += 1;
        let id = ParticipantId(self.next_id);
        self.participants
            .insert(id, Participant::new(id, name, dialect, rating, connector));
        id
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Participant> {
        self.participants.values().find(|p| p.name == name)
    }

    /// All participants, ordered by id
    pub fn list(&self) -> Vec<&Participant> {
        let mut all: Vec<_> = self.participants.values().collect();
        all.sort_by_key(|p| p.id);
        all
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn set_fallback(&mut self, id: ParticipantId) {
        self.fallback = Some(id);
    }

    pub fn fallback(&self) -> Option<ParticipantId> {
        self.fallback
    }
}
