//! Match command - relay one game between two engine processes
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: build_arena(), play(), report_results()
//! - Level 3: engine_config(), follow()
//! - Level 4: command arguments

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use tokio::sync::broadcast::error::RecvError;

use roach_core::{GameRecord, GameType, NotationRules, ParticipantId};
use roach_relay::{
    connector_for, Arena, ArenaConfig, Dialect, EngineConfig, InMemoryRepository, Roster, SessionConfig,
    SessionHandle, SpectatorEvent, TimeControl,
};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct MatchArgs {
    /// Command line of the white engine
    #[arg(long, value_name = "CMD")]
    pub white: String,

    /// Command line of the black engine
    #[arg(long, value_name = "CMD")]
    pub black: String,

    #[arg(long, value_enum, default_value = "uhp")]
    pub white_dialect: DialectArg,

    #[arg(long, value_enum, default_value = "uhp")]
    pub black_dialect: DialectArg,

    /// Initial clock per side in milliseconds
    #[arg(long, default_value = "60000")]
    pub initial_ms: u64,

    /// Fischer increment per accepted move in milliseconds
    #[arg(long, default_value = "0")]
    pub increment_ms: u64,

    /// Declare a draw after this many plies (0 = no limit)
    #[arg(long, default_value = "400")]
    pub max_plies: u32,

    /// Game type, e.g. Base or Base+MLP
    #[arg(long, default_value = "Base")]
    pub game_type: String,

    /// Allow the queen on a side's first ply
    #[arg(long)]
    pub casual: bool,

    /// Print the final record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DialectArg {
    Uhp,
    Line,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Uhp => Dialect::Uhp,
            DialectArg::Line => Dialect::Line,
        }
    }
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run match command
///
/// 1. Register both engines in a private arena
/// 2. Play the game, logging each ply from the spectator feed
/// 3. Report the final record
pub fn run(args: MatchArgs) -> Result<()> {
    let (arena, white, black) = build_arena(&args)?;

    tracing::info!("Starting match: {} vs {}", args.white, args.black);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let record = runtime.block_on(play(&arena, white, black))?;

    report_results(&record, args.json)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

fn build_arena(args: &MatchArgs) -> Result<(Arena, ParticipantId, ParticipantId)> {
    let game_type: GameType = args
        .game_type
        .parse()
        .with_context(|| format!("Invalid game type '{}'", args.game_type))?;
    let max_plies = (args.max_plies > 0).then_some(args.max_plies);

    let config = ArenaConfig::default()
        .with_time_control(TimeControl::new(
            Duration::from_millis(args.initial_ms),
            Duration::from_millis(args.increment_ms),
        ))
        .with_session(
            SessionConfig::default()
                .with_game_type(game_type)
                .with_tournament(!args.casual)
                .with_max_plies(max_plies),
        );
    config.validate()?;

    let mut roster = Roster::new();
    let initial = config.rating.initial_rating;
    let white = roster.register(
        "white",
        args.white_dialect.into(),
        initial,
        connector_for(&engine_config(&args.white)?),
    );
    let black = roster.register(
        "black",
        args.black_dialect.into(),
        initial,
        connector_for(&engine_config(&args.black)?),
    );

    let repository = Arc::new(InMemoryRepository::seeded(&roster));
    let arena = Arena::new(config, roster, Arc::new(NotationRules), repository);
    Ok((arena, white, black))
}

async fn play(arena: &Arena, white: ParticipantId, black: ParticipantId) -> Result<GameRecord> {
    let handle = arena.start_session(white, black)?;
    follow(&handle).await;

    let snapshot = handle.finished().await;
    arena.shutdown().await;
    Ok(snapshot.record)
}

fn report_results(record: &GameRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("\n=== {} ===", record.id);
    println!("Game type: {}", record.game_type);
    for ply in record.plies() {
        println!(
            "{:>4}. {:<16} {:>6} ms  ({} ms left)",
            ply.number, ply.mv.to_string(), ply.elapsed_ms, ply.remaining_ms
        );
    }
    println!("Final position: {}", record.position());
    match record.outcome() {
        Some(outcome) if record.comment.is_empty() => println!("Result: {}", outcome),
        Some(outcome) => println!("Result: {} ({})", outcome, record.comment),
        None => println!("Result: unfinished"),
    }
    Ok(())
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// Engine launch settings from a command line
fn engine_config(command_line: &str) -> Result<EngineConfig> {
    let mut words = command_line.split_whitespace().map(str::to_string);
    let Some(command) = words.next() else {
        bail!("Engine command is empty");
    };
    Ok(EngineConfig::Process {
        command,
        args: words.collect(),
    })
}

/// Log the spectator feed until the game ends
async fn follow(handle: &SessionHandle) {
    let mut events = handle.subscribe();
    loop {
        match events.recv().await {
            Ok(SpectatorEvent::Started { position, .. }) => {
                tracing::info!("{} started at {}", handle.id, position);
            }
            Ok(SpectatorEvent::Ply { ply, .. }) => {
                tracing::info!("{}. {} ({} ms)", ply.number, ply.mv, ply.elapsed_ms);
            }
            Ok(SpectatorEvent::Finished { outcome, .. }) => {
                tracing::info!("{} finished: {}", handle.id, outcome);
                break;
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Spectator feed skipped {} event(s)", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_splits_arguments() {
        let engine = engine_config("  nokamute   uhp --threads 2 ").unwrap();
        assert_eq!(
            engine,
            EngineConfig::Process {
                command: "nokamute".to_string(),
                args: vec!["uhp".to_string(), "--threads".to_string(), "2".to_string()],
            }
        );
        assert!(engine_config("   ").is_err());
    }

    #[test]
    fn test_rejects_bad_game_type() {
        let args = MatchArgs {
            white: "a".to_string(),
            black: "b".to_string(),
            white_dialect: DialectArg::Uhp,
            black_dialect: DialectArg::Line,
            initial_ms: 1000,
            increment_ms: 0,
            max_plies: 0,
            game_type: "Chess".to_string(),
            casual: false,
            json: false,
        };
        assert!(build_arena(&args).is_err());
    }

    #[tokio::test]
    async fn test_missing_engine_faults_white() {
        let args = MatchArgs {
            white: "/nonexistent/roach-engine".to_string(),
            black: "/nonexistent/other-engine".to_string(),
            white_dialect: DialectArg::Uhp,
            black_dialect: DialectArg::Uhp,
            initial_ms: 1000,
            increment_ms: 0,
            max_plies: 10,
            game_type: "Base+M".to_string(),
            casual: true,
            json: false,
        };
        let (arena, white, black) = build_arena(&args).unwrap();
        assert!(!arena.config.session.tournament);
        assert_eq!(arena.config.session.max_plies, Some(10));

        let record = play(&arena, white, black).await.unwrap();
        assert!(record.outcome().unwrap().is_fault());
        assert!(record.plies().is_empty());
    }
}
