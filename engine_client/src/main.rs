//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p engine_client -- [--host 127.0.0.1] [--port 7777] [--name Player]
//!
//! Connects to a server, retransmits `RegisterUdp` until the datagram path is
//! confirmed by a snapshot, and prints periodic status while forwarding
//! stdin lines as movement targets (`move <x> <y>`) for manual testing.

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use engine_client::client::{ClientState, GameClient};
use engine_shared::{config::EngineConfig, math::Point, wire::Action};
use tokio::sync::mpsc;
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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
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
    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    info!(client_id = ?client.client_id, "connected to server");

    let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Connected. Type 'move <x> <y>' to move, 'status' for info, 'quit' to exit.");

    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);

    loop {
        while let Ok(line) = line_rx.try_recv() {
            handle_line(&mut client, &line).await;
        }

        client.poll().await?;

        for event in client.lifecycle.drain() {
            info!(?event, "lifecycle event");
        }

        if client.state() == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }

        tokio::time::sleep(tick_interval).await;
    }

    Ok(())
}

async fn handle_line(client: &mut GameClient, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["move", x, y] => {
            let (Ok(x), Ok(y)) = (x.parse::<f32>(), y.parse::<f32>()) else {
                println!("usage: move <x> <y>");
                return;
            };
            if let Err(e) = client.send_input(Action::Move, Point::new(x, y)).await {
                println!("move failed: {e}");
            }
        }
        ["status"] => {
            println!("state: {:?}", client.state());
            println!("level: {}", client.current_level().name);
            println!("last snapshot tick: {:?}", client.last_snapshot_tick);
        }
        ["quit"] | ["exit"] => std::process::exit(0),
        _ => println!("unknown command: {line}"),
    }
}
