//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p engine_server -- [--host 0.0.0.0] [--port 7777] [--tick-hz 20] [--snapshot-hz 20]
//!
//! The server binds one TCP listener and one UDP socket to the same port,
//! accepts clients via the reliable handshake, and runs the fixed-timestep
//! tick loop for the lifetime of the process.

use std::env;

use anyhow::Context;
use engine_server::{server::GameServer, tick};
use engine_shared::{config::EngineConfig, level::SequentialLevelCatalog, math::Point};
use tracing::info;

fn parse_args() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" if i + 1 < args.len() => {
                cfg.host = args[i + 1].clone();
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1].parse().unwrap_or(cfg.port);
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--snapshot-hz" if i + 1 < args.len() => {
                cfg.snapshot_hz = args[i + 1].parse().unwrap_or(cfg.snapshot_hz);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = parse_args();
    info!(host = %cfg.host, port = cfg.port, tick_hz = cfg.tick_hz, "starting server");

    // Level sequencing is a narrow collaborator per engine_shared::level; the
    // binary wires in a single default level since map authoring is out of
    // scope for this core.
    let catalog = Box::new(SequentialLevelCatalog::single("maze", Point::ZERO));
    let mut server = GameServer::new(cfg, catalog).await.context("create server")?;
    info!(addr = %server.local_addr(), "server listening");

    tick::run(&mut server).await
}
