//! Client implementation.
//!
//! The client maintains a reliable control stream (handshake, level changes,
//! game-over) and an unreliable datagram channel (input out, snapshots in),
//! plus a local mirror `World` that snapshots are applied onto. Connection
//! lifecycle transitions are surfaced through `engine_shared::lifecycle` so a
//! caller (the binary, or a test) can observe connect/disconnect without
//! polling `state()` every frame.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use engine_shared::{
    config::EngineConfig,
    ecs::{EntityName, Position, World},
    level::LevelDef,
    lifecycle::{ConnectionEvent, LifecycleQueue, LifecycleSender},
    math::Point,
    snapshot::{DefaultSnapshotTranslator, SnapshotTranslator},
    transport::{ReliableConn, UnreliableConn},
    wire::{Action, ClientId, NetMsg},
};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::interp::SnapshotBuffer;

/// Maximum `RegisterUdp` retransmission attempts before giving up and relying
/// solely on the caller to notice no snapshots are arriving.
const REGISTER_UDP_MAX_ATTEMPTS: u32 = 5;
const REGISTER_UDP_RETRY: Duration = Duration::from_millis(500);

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Reliable handshake acknowledged, UDP registration still in flight.
    Connected,
    /// First snapshot received: the datagram path is confirmed working.
    Registered,
    /// Reliable channel closed or the server sent `GameOver`.
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub client_id: ClientId,
    state: ClientState,

    reliable: ReliableConn,
    unreliable: UnreliableConn,

    mirror: World,
    /// Applies received snapshots to `mirror`; swappable via
    /// `set_snapshot_translator` (spec §6), defaulting to the plain
    /// `TickGuard`-backed implementation.
    translator: Box<dyn SnapshotTranslator>,
    current_level: LevelDef,

    register_attempts: u32,
    next_register_at: Instant,

    lifecycle_tx: LifecycleSender,
    pub lifecycle: LifecycleQueue,

    pub last_snapshot_tick: Option<u64>,
    pub interp: SnapshotBuffer,
}

impl GameClient {
    /// Connects to a server and performs the two-phase handshake: reliable
    /// `ConnectRequest` → `ConnectAck`/`ConnectReject`, then the caller's
    /// `poll` loop drives the `RegisterUdp` retransmit until the first
    /// snapshot arrives.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.socket_addr().parse().context("parse server address")?;
        info!(server = %server_addr, name = %cfg.player_name, "connecting to server");

        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let unreliable = UnreliableConn::connect(bind, server_addr).await.context("udp connect")?;

        let stream = TcpStream::connect(server_addr).await.context("tcp connect")?;
        let mut reliable = ReliableConn::new(stream);

        reliable.send(&NetMsg::ConnectRequest { player_name: cfg.player_name.clone() }).await?;

        let client_id = match reliable.recv().await? {
            NetMsg::ConnectAck { client_id } => client_id,
            NetMsg::ConnectReject { reason } => anyhow::bail!("connect rejected: {reason}"),
            other => anyhow::bail!("expected ConnectAck, got {other:?}"),
        };

        let current_level = match reliable.recv().await? {
            NetMsg::LevelChange { level_name, spawn_point } => {
                LevelDef::new(level_name, spawn_point.unwrap_or(Point::ZERO))
            }
            other => anyhow::bail!("expected LevelChange, got {other:?}"),
        };

        info!(client_id = ?client_id, level = %current_level.name, "connected");

        let (lifecycle_tx, lifecycle) = LifecycleQueue::channel();
        let _ = lifecycle_tx.send(ConnectionEvent::Connected { client_id });

        Ok(Self {
            client_id,
            state: ClientState::Connected,
            reliable,
            unreliable,
            mirror: World::default(),
            translator: Box::new(DefaultSnapshotTranslator::new()),
            current_level,
            register_attempts: 0,
            next_register_at: Instant::now(),
            lifecycle_tx,
            lifecycle,
            last_snapshot_tick: None,
            interp: SnapshotBuffer::new(),
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn current_level(&self) -> &LevelDef {
        &self.current_level
    }

    pub fn entity_position(&self, name: &EntityName) -> Option<Point> {
        let id = self.mirror.entity_by_name(name)?;
        self.mirror.get::<Position>(id).map(|p| p.0)
    }

    /// Drains every queue once: retransmits `RegisterUdp` if still pending,
    /// reads any buffered reliable message without blocking, and drains
    /// pending datagrams (snapshots). Intended to be called once per client
    /// frame/tick.
    pub async fn poll(&mut self) -> anyhow::Result<()> {
        if self.state == ClientState::Disconnected {
            return Ok(());
        }

        self.retransmit_register_udp().await;
        self.poll_reliable().await?;
        self.poll_datagrams()?;
        Ok(())
    }

    async fn retransmit_register_udp(&mut self) {
        if self.state != ClientState::Connected {
            return;
        }
        if Instant::now() < self.next_register_at {
            return;
        }
        if self.register_attempts >= REGISTER_UDP_MAX_ATTEMPTS {
            return;
        }

        self.register_attempts += 1;
        self.next_register_at = Instant::now() + REGISTER_UDP_RETRY;
        if let Err(e) = self.unreliable.send(&NetMsg::RegisterUdp { client_id: self.client_id }).await {
            warn!(error = %e, attempt = self.register_attempts, "failed to send RegisterUdp");
        } else {
            debug!(attempt = self.register_attempts, "sent RegisterUdp");
        }
    }

    async fn poll_reliable(&mut self) -> anyhow::Result<()> {
        match tokio::time::timeout(Duration::from_millis(1), self.reliable.recv()).await {
            Ok(Ok(msg)) => self.handle_reliable_message(msg),
            Ok(Err(e)) => {
                warn!(error = %e, "reliable connection closed");
                self.disconnect(Some(e.to_string()));
            }
            Err(_) => {} // nothing buffered
        }
        Ok(())
    }

    fn handle_reliable_message(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::LevelChange { level_name, spawn_point } => {
                self.current_level = LevelDef::new(level_name, spawn_point.unwrap_or(Point::ZERO));
                info!(level = %self.current_level.name, "level changed");
            }
            NetMsg::EntitySpawnEvent { entity_name, position, .. } => {
                let id = self.mirror.spawn_named(entity_name);
                self.mirror.insert(id, Position(position));
            }
            NetMsg::GameOver => {
                info!("server reported game over");
                self.disconnect(None);
            }
            other => debug!(?other, "unhandled reliable message"),
        }
    }

    fn poll_datagrams(&mut self) -> anyhow::Result<()> {
        loop {
            match self.unreliable.try_recv() {
                Ok(Some(msg)) => self.handle_datagram(msg),
                Ok(None) => break,
                Err(e) => warn!(error = %e, "datagram decode/recv error, dropping"),
            }
        }
        Ok(())
    }

    fn handle_datagram(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::Snapshot(snapshot) => {
                if self.state == ClientState::Connected {
                    self.state = ClientState::Registered;
                    info!("datagram path confirmed by first snapshot");
                }
                // Gate the interpolation buffer on the same monotonic guard
                // as the mirror: a reordered stale snapshot must not enter
                // either one, or rendering could briefly interpolate
                // backwards even though the authoritative mirror held firm.
                if self.translator.apply(&snapshot, &mut self.mirror) {
                    self.last_snapshot_tick = Some(snapshot.server_tick);
                    self.interp.push(snapshot);
                }
            }
            other => debug!(?other, "unexpected datagram"),
        }
    }

    fn disconnect(&mut self, reason: Option<String>) {
        self.state = ClientState::Disconnected;
        let _ = self.lifecycle_tx.send(ConnectionEvent::Disconnected { client_id: self.client_id, reason });
    }

    /// Sends one input action. Refused before the reliable handshake has
    /// produced a client id (impossible to reach via `connect`, but kept as
    /// a guard for callers holding a client across a disconnect) and once
    /// disconnected.
    pub async fn send_input(&mut self, action: Action, point: Point) -> anyhow::Result<()> {
        if self.state == ClientState::Disconnected {
            anyhow::bail!("cannot send input: client is disconnected");
        }
        self.unreliable.send(&NetMsg::Input { client_id: self.client_id, action, point }).await?;
        Ok(())
    }

    /// Convenience for the common case: move toward `target`.
    pub async fn send_move(&mut self, target: Point) -> anyhow::Result<()> {
        self.send_input(Action::Move, target).await
    }

    /// Sends an arbitrary message on the reliable channel (e.g.
    /// `RequestEntitySpawn`). Most callers want `send_input`/`send_move`
    /// instead; this is the generic escape hatch spec §6's `send` names.
    pub async fn send_reliable(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        if self.state == ClientState::Disconnected {
            anyhow::bail!("cannot send: client is disconnected");
        }
        self.reliable.send(msg).await?;
        Ok(())
    }

    /// Installs a custom snapshot translator, replacing the default
    /// `TickGuard`-backed one. Per spec §6's `setSnapshotTranslator`.
    pub fn set_snapshot_translator(&mut self, translator: Box<dyn SnapshotTranslator>) {
        self.translator = translator;
    }
}
