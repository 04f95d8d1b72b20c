//! Scripted fake engines and arena plumbing for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use roach_core::{NotationRules, ParticipantId, Position, Rating, Side};
use roach_relay::{
    Connector, ConnectError, Dialect, InMemoryRepository, LineChannel, Participant, RatingConfig, RatingService,
    SessionConfig, SessionContext, SessionRegistry, TimeControl, Transport,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

/// What the engine does when asked for a move
#[derive(Clone, Debug)]
pub enum Step {
    /// Think, then answer with a single reply line
    Reply { think: Duration, text: String },
    /// Think, then write these lines verbatim
    Raw { think: Duration, lines: Vec<String> },
    /// Never answer
    Silent,
    /// Close the connection
    Exit,
}

pub fn reply(think_ms: u64, text: &str) -> Step {
    Step::Reply {
        think: Duration::from_millis(think_ms),
        text: text.to_string(),
    }
}

pub fn raw(lines: &[&str]) -> Step {
    Step::Raw {
        think: Duration::ZERO,
        lines: lines.iter().map(|l| l.to_string()).collect(),
    }
}

/// In-process engine speaking either dialect over a duplex pipe
#[derive(Clone)]
pub struct FakeEngine {
    pub dialect: Dialect,
    steps: Arc<Mutex<VecDeque<Step>>>,
    log: Arc<Mutex<Vec<String>>>,
    /// Written as soon as the relay connects, before anything is asked
    opening: Vec<String>,
}

impl FakeEngine {
    pub fn uhp(steps: Vec<Step>) -> Self {
        Self::new(Dialect::Uhp, steps)
    }

    pub fn line(steps: Vec<Step>) -> Self {
        Self::new(Dialect::Line, steps)
    }

    fn new(dialect: Dialect, steps: Vec<Step>) -> Self {
        Self {
            dialect,
            steps: Arc::new(Mutex::new(steps.into())),
            log: Arc::new(Mutex::new(Vec::new())),
            opening: Vec::new(),
        }
    }

    pub fn with_opening(mut self, lines: &[&str]) -> Self {
        self.opening = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Every line the relay sent, in order
    pub fn heard(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.heard().iter().filter(|l| l.as_str() == line).count()
    }

    fn next_step(&self) -> Step {
        self.steps.lock().unwrap().pop_front().unwrap_or(Step::Silent)
    }

    /// Output for a move request; None closes the connection
    async fn act(&self) -> Option<String> {
        match self.next_step() {
            Step::Reply { think, text } => {
                tokio::time::sleep(think).await;
                Some(match self.dialect {
                    Dialect::Uhp => format!("{}\nok\n", text),
                    Dialect::Line => format!("{}\n", text),
                })
            }
            Step::Raw { think, lines } => {
                tokio::time::sleep(think).await;
                Some(lines.iter().map(|l| format!("{}\n", l)).collect())
            }
            Step::Silent => std::future::pending().await,
            Step::Exit => None,
        }
    }

    async fn serve(self, stream: DuplexStream) {
        let (read, mut write) = split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut position: Option<Position> = None;
        let mut answering = false;
        // Line dialect: our colour is the side to move in the first position we are sent
        let mut side: Option<Side> = None;
        let mut turn = false;

        if !self.opening.is_empty() {
            let opening: String = self.opening.iter().map(|l| format!("{}\n", l)).collect();
            if write.write_all(opening.as_bytes()).await.is_err() {
                return;
            }
        }

        while let Ok(Some(line)) = lines.next_line().await {
            self.log.lock().unwrap().push(line.clone());

            let output = match self.dialect {
                Dialect::Uhp => {
                    if let Some(game) = line.strip_prefix("newgame ") {
                        let parsed: Position = game.parse().unwrap();
                        let echo = format!("{}\nok\n", parsed);
                        position = Some(parsed);
                        Some(echo)
                    } else if let Some(mv) = line.strip_prefix("play ") {
                        let next = position.as_ref().unwrap().apply(&mv.parse().unwrap());
                        let echo = format!("{}\nok\n", next);
                        position = Some(next);
                        Some(echo)
                    } else if line == "bestmove" {
                        self.act().await
                    } else {
                        Some("err unknown command\nok\n".to_string())
                    }
                }
                Dialect::Line => {
                    let trigger = if answering {
                        line == "ok" || line.starts_with("err")
                    } else if let Ok(sent) = line.parse::<Position>() {
                        // A position for the other side acknowledges our move
                        let own = *side.get_or_insert(sent.to_move());
                        turn = sent.to_move() == own;
                        turn
                    } else {
                        turn && line.starts_with("err")
                    };
                    if !trigger {
                        continue;
                    }
                    answering = false;
                    let output = self.act().await;
                    if let Some(text) = &output {
                        let word = text.split_whitespace().next().unwrap_or("");
                        answering = matches!(word, "validmoves" | "newgame" | "info" | "undo");
                    }
                    output
                }
            };

            match output {
                Some(text) => {
                    if write.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                None => return,
            }
        }
    }
}

#[async_trait]
impl Connector for FakeEngine {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError> {
        let (relay_end, engine_end) = tokio::io::duplex(64 * 1024);
        let (read, write) = split(relay_end);
        tokio::spawn(self.clone().serve(engine_end));
        Ok(Box::new(LineChannel::from_stream(format!("fake-{}", self.dialect), read, write)))
    }

    fn describe(&self) -> String {
        format!("fake {} engine", self.dialect)
    }
}

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub repository: Arc<InMemoryRepository>,
    pub context: SessionContext,
}

pub fn harness(session: SessionConfig, time_control: TimeControl) -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let repository = Arc::new(InMemoryRepository::new());
    let context = SessionContext {
        rules: Arc::new(NotationRules),
        repository: repository.clone(),
        ratings: RatingService::new(repository.clone(), &RatingConfig::default()),
        registry: registry.clone(),
        session,
        time_control,
    };
    Harness {
        registry,
        repository,
        context,
    }
}

impl Harness {
    /// Participant backed by `connector`, seeded with `rating`
    pub fn participant(
        &self,
        id: u32,
        dialect: Dialect,
        rating: Rating,
        connector: Arc<dyn Connector>,
    ) -> Participant {
        let id = ParticipantId(id);
        self.repository.set_rating(id, rating);
        Participant::new(id, format!("engine-{}", id.0), dialect, rating, connector)
    }

    pub fn fake(&self, id: u32, engine: &FakeEngine) -> Participant {
        self.participant(id, engine.dialect, 1500, Arc::new(engine.clone()))
    }
}

/// Let spawned engine tasks consume whatever the relay wrote last
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub fn minutes(n: u64) -> TimeControl {
    TimeControl::new(Duration::from_secs(60 * n), Duration::ZERO)
}

pub fn seconds(n: u64) -> TimeControl {
    TimeControl::new(Duration::from_secs(n), Duration::ZERO)
}
