//! Full socket-based integration tests for client <-> server communication.

use std::time::Duration;

use engine_client::client::ClientState;
use engine_client::GameClient;
use engine_server::GameServer;
use engine_shared::{
    config::EngineConfig,
    ecs::EntityName,
    math::Point,
    wire::{decode, encode, ClientId, NetMsg},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").with_test_writer().try_init();
}

fn client_config(server: &GameServer, name: &str) -> EngineConfig {
    EngineConfig {
        host: "127.0.0.1".to_string(),
        port: server.local_addr().port(),
        player_name: name.to_string(),
        ..Default::default()
    }
}

/// Unit-style test: protocol messages roundtrip through the wire codec.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let ack = NetMsg::ConnectAck { client_id: ClientId(1) };
    assert_eq!(decode(&encode(&ack)?)?, ack);

    let reject = NetMsg::ConnectReject { reason: "taken".into() };
    assert_eq!(decode(&encode(&reject)?)?, reject);

    Ok(())
}

/// Spawns the server's own tick loop as a background task so client-side
/// tests can drive connect/poll concurrently with it, the way the two
/// processes run in production.
fn spawn_server_loop(mut server: GameServer) -> tokio::task::JoinHandle<GameServer> {
    tokio::spawn(async move {
        loop {
            if server.step().await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        server
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_connects_and_receives_a_snapshot() -> anyhow::Result<()> {
    init_tracing();

    let server = GameServer::bind_ephemeral().await?;
    let cfg = client_config(&server, "Alice");
    let server_handle = spawn_server_loop(server);

    let mut client = GameClient::connect(&cfg).await?;
    assert_eq!(client.state(), ClientState::Connected);

    let mut received = false;
    for _ in 0..40 {
        client.poll().await?;
        if client.last_snapshot_tick.is_some() {
            received = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(received, "expected at least one snapshot within the poll window");
    assert_eq!(client.state(), ClientState::Registered);

    server_handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn movement_input_is_reflected_in_later_snapshots() -> anyhow::Result<()> {
    init_tracing();

    let server = GameServer::bind_ephemeral().await?;
    let cfg = client_config(&server, "Alice");
    let server_handle = spawn_server_loop(server);

    let mut client = GameClient::connect(&cfg).await?;
    let client_id_name = EntityName::from(format!("hero_{}", client.client_id.0));

    // Drive poll until registered (first snapshot), then send repeated moves.
    for _ in 0..40 {
        client.poll().await?;
        if client.state() == ClientState::Registered {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let start = client.entity_position(&client_id_name);

    for _ in 0..20 {
        client.send_move(Point::new(1.0, 0.0)).await?;
        client.poll().await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let end = client.entity_position(&client_id_name).expect("entity present after movement");
    if let Some(start) = start {
        assert!(end.x > start.x, "expected x to increase, start={start:?} end={end:?}");
    } else {
        assert!(end.x > 0.0, "expected positive x after movement, got {end:?}");
    }

    server_handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_clients_each_see_both_entities_in_snapshots() -> anyhow::Result<()> {
    init_tracing();

    let server = GameServer::bind_ephemeral().await?;
    let cfg_a = client_config(&server, "Alice");
    let cfg_b = client_config(&server, "Bob");
    let server_handle = spawn_server_loop(server);

    let mut alice = GameClient::connect(&cfg_a).await?;
    let mut bob = GameClient::connect(&cfg_b).await?;

    let mut alice_saw_two = false;
    for _ in 0..60 {
        alice.poll().await?;
        bob.poll().await?;
        if let Some(snap) = alice.interp.last_snapshot() {
            if snap.entities.len() >= 2 {
                alice_saw_two = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(alice_saw_two, "expected Alice's snapshot to eventually contain both entities");

    server_handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_player_name_is_rejected_at_connect() -> anyhow::Result<()> {
    init_tracing();

    let server = GameServer::bind_ephemeral().await?;
    let cfg = client_config(&server, "Alice");
    let server_handle = spawn_server_loop(server);

    let _first = GameClient::connect(&cfg).await?;
    let second = GameClient::connect(&cfg).await;
    assert!(second.is_err(), "expected duplicate name to be rejected");

    server_handle.abort();
    Ok(())
}
