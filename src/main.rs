//! Doomerang Game Server
//!
//! Usage:
//!   doomerang-server [--port 7373] [--tickrate 20] [--name NAME]
//!                    [--level level.json] [--max-players 8]
//!                    [--version-check true|false] [--config sim.json]
//!                    [--registry http://master:8080] [--public-addr host:port]
//!                    [--region REGION]
//!
//! Runs the authoritative simulation and serves it over WebSocket.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use doomerang::{
    network::{GameServer, Registration, RegistrationInfo, ServerConfig},
    LevelData, SimConfig, DEFAULT_TICK_RATE, VERSION,
};

/// Command line options.
struct Options {
    server: ServerConfig,
    sim_config: Option<PathBuf>,
    public_addr: Option<String>,
    region: String,
}

fn parse_args() -> Options {
    let mut opts = Options {
        server: ServerConfig::default(),
        sim_config: None,
        public_addr: None,
        region: "local".to_string(),
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--port", Some(v)) => {
                let port = v.parse().unwrap_or(7373);
                opts.server.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
                i += 2;
            }
            ("--tickrate", Some(v)) => {
                opts.server.tick_rate = v.parse().unwrap_or(DEFAULT_TICK_RATE);
                i += 2;
            }
            ("--name", Some(v)) => {
                opts.server.name = v;
                i += 2;
            }
            ("--level", Some(v)) => {
                opts.server.level_path = Some(PathBuf::from(v));
                i += 2;
            }
            ("--max-players", Some(v)) => {
                opts.server.max_players = v.parse().unwrap_or(opts.server.max_players);
                i += 2;
            }
            ("--version-check", Some(v)) => {
                opts.server.version_check = v != "false" && v != "0";
                i += 2;
            }
            ("--registry", Some(v)) => {
                opts.server.registry_url = Some(v);
                i += 2;
            }
            ("--config", Some(v)) => {
                opts.sim_config = Some(PathBuf::from(v));
                i += 2;
            }
            ("--public-addr", Some(v)) => {
                opts.public_addr = Some(v);
                i += 2;
            }
            ("--region", Some(v)) => {
                opts.region = v;
                i += 2;
            }
            (flag, _) => {
                warn!("Ignoring argument {:?}", flag);
                i += 1;
            }
        }
    }
    opts
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let opts = parse_args();
    let config = opts.server;

    info!("Doomerang Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.tick_rate);

    let mut sim_config = match &opts.sim_config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("load simulation config {}", path.display()))?,
        None => SimConfig::default(),
    };
    sim_config.tick_rate = config.tick_rate;
    sim_config.validate().context("invalid simulation config")?;

    let level = match &config.level_path {
        Some(path) => LevelData::load(path)
            .with_context(|| format!("load level {}", path.display()))?,
        None => LevelData::arena(),
    };
    info!(
        level = %level.name,
        substeps = sim_config.substeps(),
        "Level loaded"
    );

    let server = Arc::new(GameServer::new(config.clone(), sim_config, level));
    let listener = server.bind().await.context("bind listener")?;

    if let Some(master_url) = &config.registry_url {
        let address = opts
            .public_addr
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", config.bind_addr.port()));
        let registration = Registration::new(
            RegistrationInfo {
                master_url: master_url.clone(),
                name: config.name.clone(),
                address,
                version: config.version.clone(),
                region: opts.region.clone(),
                max_players: config.max_players,
            },
            server.player_counter(),
        );
        tokio::spawn(registration.run(server.subscribe_shutdown()));
    }

    let serve = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    shutdown_signal().await;
    server.shutdown();

    serve.await.context("server task panicked")??;
    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
