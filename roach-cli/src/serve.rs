//! Serve command - run the arena behind the HTTP API
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: load_config(), build_arena(), serve()
//! - Level 3: (delegated to roach-relay and roach-server)
//! - Level 4: command arguments

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use roach_core::NotationRules;
use roach_relay::{Arena, ArenaConfig, InMemoryRepository, Roster};
use roach_server::{run_server, ServerConfig};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct ServeArgs {
    /// Arena configuration (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Port number to listen on
    #[arg(long, default_value = "8000")]
    pub port: u16,

    /// Seed for random colour assignment (overrides the file)
    #[arg(long)]
    pub seed: Option<u64>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run serve command
///
/// 1. Load configuration
/// 2. Build the arena
/// 3. Serve until Ctrl-C, then drain live sessions
pub fn run(args: ServeArgs) -> Result<()> {
    let config = load_config(&args)?;
    let arena = Arc::new(build_arena(config));

    tracing::info!(
        "Arena ready with {} participant(s)",
        arena.roster.len()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(arena, ServerConfig::default().with_port(args.port)))
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

fn load_config(args: &ServeArgs) -> Result<ArenaConfig> {
    let mut config = ArenaConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.matchmaking.seed = Some(seed);
    }
    Ok(config)
}

fn build_arena(config: ArenaConfig) -> Arena {
    let roster = Roster::from_config(&config);
    let repository = Arc::new(InMemoryRepository::seeded(&roster));
    Arena::new(config, roster, Arc::new(NotationRules), repository)
}

async fn serve(arena: Arc<Arena>, config: ServerConfig) -> Result<()> {
    let scheduler = arena.spawn_scheduler();

    let served = run_server(config, arena.clone(), ctrl_c()).await;

    arena.shutdown().await;
    scheduler.await?;
    served
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
        Err(err) => {
            tracing::error!("Cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use roach_relay::ParticipantConfig;

    fn config() -> ArenaConfig {
        ArenaConfig::default()
            .with_participant(ParticipantConfig::process("mzinga", "MzingaEngine", vec![]))
            .with_participant(ParticipantConfig::process("nokamute", "nokamute", vec!["uhp".into()]).with_rating(1700))
            .with_fallback("mzinga")
    }

    #[test]
    fn test_build_arena_from_config() {
        let arena = build_arena(config());
        assert_eq!(arena.roster.len(), 2);

        let fallback = arena.roster.fallback().unwrap();
        assert_eq!(arena.roster.get(fallback).unwrap().name, "mzinga");
        assert_eq!(arena.roster.by_name("nokamute").unwrap().initial_rating, 1700);
    }

    #[test]
    fn test_load_config_applies_seed() {
        let path = std::env::temp_dir().join(format!("roach-serve-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&config()).unwrap()).unwrap();

        let args = ServeArgs {
            config: path.clone(),
            port: 8000,
            seed: Some(42),
        };
        let loaded = load_config(&args).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.matchmaking.seed, Some(42));
        assert_eq!(loaded.participants.len(), 2);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let args = ServeArgs {
            config: PathBuf::from("/nonexistent/arena.json"),
            port: 8000,
            seed: None,
        };
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
