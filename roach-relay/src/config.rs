//! Arena configuration
//!
//! Level 4 - Utilities and configuration

use anyhow::{bail, Context, Result};
use roach_core::{GameType, Rating, DEFAULT_K_FACTOR, INITIAL_RATING};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::adapter::Dialect;

/// Per-side clock policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeControl {
    /// Starting clock for each side
    pub initial_ms: u64,
    /// Fischer increment added after each accepted move
    pub increment_ms: u64,
}

impl Default for TimeControl {
    fn default() -> Self {
        Self {
            initial_ms: 60_000,
            increment_ms: 0,
        }
    }
}

impl TimeControl {
    pub fn new(initial: Duration, increment: Duration) -> Self {
        Self {
            initial_ms: initial.as_millis() as u64,
            increment_ms: increment.as_millis() as u64,
        }
    }

    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn increment(&self) -> Duration {
        Duration::from_millis(self.increment_ms)
    }
}

/// Rules applied to every game the arena relays
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub game_type: GameType,
    /// Forbid the queen on each side's first ply
    pub tournament: bool,
    /// Illegal replies tolerated per ply before the mover faults
    pub illegal_move_quota: u32,
    /// Bound on connecting, the newgame handshake and each `play` acknowledgement
    pub handshake_timeout_ms: u64,
    /// Declare a draw after this many plies
    pub max_plies: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game_type: GameType::Base,
            tournament: true,
            illegal_move_quota: 3,
            handshake_timeout_ms: 10_000,
            max_plies: Some(400),
        }
    }
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn with_game_type(mut self, game_type: GameType) -> Self {
        self.game_type = game_type;
        self
    }

    pub fn with_tournament(mut self, tournament: bool) -> Self {
        self.tournament = tournament;
        self
    }

    pub fn with_quota(mut self, quota: u32) -> Self {
        self.illegal_move_quota = quota;
        self
    }

    pub fn with_max_plies(mut self, max_plies: Option<u32>) -> Self {
        self.max_plies = max_plies;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// How colours are assigned to a fresh pairing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPolicy {
    /// Oldest ticket takes white, then black, then white...
    #[default]
    Alternate,
    /// Coin flip per pairing
    Random,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Pairing pass period
    pub interval_ms: u64,
    /// Rating window for a ticket that has just been enqueued
    pub base_tolerance: u32,
    /// Window growth per second of waiting
    pub widen_per_sec: f64,
    /// Upper bound on the window, if any
    pub max_tolerance: Option<u32>,
    /// Wait after which the oldest ticket is paired with the fallback participant
    pub fallback_after_ms: Option<u64>,
    pub color_policy: ColorPolicy,
    /// Seed for the random colour policy (None = entropy)
    pub seed: Option<u64>,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            base_tolerance: 100,
            widen_per_sec: 10.0,
            max_tolerance: None,
            fallback_after_ms: Some(60_000),
            color_policy: ColorPolicy::Alternate,
            seed: None,
        }
    }
}

impl MatchmakingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fallback_after(&self) -> Option<Duration> {
        self.fallback_after_ms.map(Duration::from_millis)
    }

    pub fn with_tolerance(mut self, base: u32, widen_per_sec: f64) -> Self {
        self.base_tolerance = base;
        self.widen_per_sec = widen_per_sec;
        self
    }

    pub fn with_color_policy(mut self, policy: ColorPolicy) -> Self {
        self.color_policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub k_factor: f64,
    /// Rating for participants registered without one
    pub initial_rating: Rating,
    /// Compare-and-swap attempts before a rating update is abandoned
    pub max_attempts: u32,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: INITIAL_RATING,
            max_attempts: 5,
        }
    }
}

/// How the relay reaches a participant's engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineConfig {
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Tcp {
        addr: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub name: String,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub dialect: Dialect,
    pub engine: EngineConfig,
}

impl ParticipantConfig {
    pub fn process(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            rating: None,
            dialect: Dialect::Uhp,
            engine: EngineConfig::Process {
                command: command.into(),
                args,
            },
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Top-level arena configuration file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub time_control: TimeControl,
    pub session: SessionConfig,
    pub matchmaking: MatchmakingConfig,
    pub rating: RatingConfig,
    pub participants: Vec<ParticipantConfig>,
    /// Name of the always-available participant used against starving tickets
    pub fallback: Option<String>,
}

impl ArenaConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: ArenaConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Participant names are unique and the fallback names one of them
    pub fn validate(&self) -> Result<()> {
        let mut names = FxHashSet::default();
        for participant in &self.participants {
            if !names.insert(participant.name.as_str()) {
                bail!("Duplicate participant name '{}'", participant.name);
            }
        }
        if let Some(fallback) = &self.fallback {
            if !names.contains(fallback.as_str()) {
                bail!("Fallback participant '{}' is not configured", fallback);
            }
        }
        if self.time_control.initial_ms == 0 {
            bail!("time_control.initial_ms must be positive");
        }
        Ok(())
    }

    pub fn with_time_control(mut self, time_control: TimeControl) -> Self {
        self.time_control = time_control;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_matchmaking(mut self, matchmaking: MatchmakingConfig) -> Self {
        self.matchmaking = matchmaking;
        self
    }

    pub fn with_participant(mut self, participant: ParticipantConfig) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }
}
