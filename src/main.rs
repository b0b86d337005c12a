//! shardcraft - an authoritative voxel sandbox world server.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::ServerConfig;
use shardcraft_core::EntityIdAllocator;
use shardcraft_server::{
    accept_loop, AllowAllAuthenticator, ConnConfig, ConnContext, Game, SessionConfig,
    SessionContext,
};
use shardcraft_world::{GameRules, LocalShardManager, ShardConfig, WorldStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shardcraft", about = "Authoritative voxel sandbox world server")]
struct Args {
    /// Path to the server config file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// World directory (overrides the config file).
    #[arg(long)]
    world: Option<PathBuf>,

    /// Bind address (overrides the config file).
    #[arg(long)]
    bind: Option<String>,

    /// Maximum player count (overrides the config file).
    #[arg(long)]
    max_players: Option<usize>,

    /// Server description shown in server lists.
    #[arg(long)]
    description: Option<String>,

    /// Refuse logins with this maintenance message.
    #[arg(long)]
    maintenance: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = ServerConfig::load_from_path(&args.config);
    if let Some(world) = args.world {
        config.world_path = world.display().to_string();
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(max_players) = args.max_players {
        config.max_players = max_players;
    }
    if let Some(description) = args.description {
        config.server_description = description;
    }
    if let Some(maintenance) = args.maintenance {
        config.maintenance_message = maintenance;
    }

    info!("Starting shardcraft v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> Result<()> {
    let world = Arc::new(
        WorldStore::open(Path::new(&config.world_path))
            .with_context(|| format!("failed to open world at {}", config.world_path))?,
    );
    info!(
        "world open: spawn {:?}, time {}",
        world.level.spawn, world.level.time
    );

    let rules = Arc::new(GameRules::load(Path::new("config")));
    let entities = Arc::new(EntityIdAllocator::new());
    let mgr = LocalShardManager::new(
        world.chunks.clone(),
        Arc::clone(&rules),
        Arc::clone(&entities),
        ShardConfig {
            spawn_mobs: config.spawn_mobs,
            ..ShardConfig::default()
        },
    );

    let (game, _game_stop) = Game::spawn(world.level.time);

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("listening on {}", config.bind_address);

    let ctx = ConnContext {
        game: game.clone(),
        session: SessionContext {
            game,
            mgr: Arc::clone(&mgr),
            rules,
            entities,
            world,
            config: SessionConfig {
                ping_id_relaxed: config.ping_id_relaxed,
                max_players: config.max_players,
                ..SessionConfig::default()
            },
        },
        auth: Arc::new(AllowAllAuthenticator),
        config: ConnConfig {
            max_players: config.max_players,
            server_desc: config.server_description.clone(),
            maintenance_msg: (!config.maintenance_message.is_empty())
                .then(|| config.maintenance_message.clone()),
        },
    };

    let accept = tokio::spawn(accept_loop(listener, ctx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutting down");
    accept.abort();
    mgr.stop_all().await;

    Ok(())
}
