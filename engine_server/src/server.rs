//! Server implementation.
//!
//! An authoritative tick-based server: binds the reliable stream and
//! datagram socket to one port, accepts clients via a two-phase handshake
//! (reliable CONNECT_REQUEST/CONNECT_ACK, then UDP REGISTER_UDP), and runs a
//! fixed-rate tick loop that reconciles sessions against the world, drains
//! input, advances the simulation, and periodically broadcasts snapshots.
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use engine_shared::{
    config::EngineConfig,
    controller::{EntityController, SimController},
    dispatch::{Dispatcher, MsgTag},
    ecs::{EntityId, EntityName, Position, World},
    level::{LevelCatalog, LevelDef, LevelTransition, SequentialLevelCatalog},
    lifecycle::{ConnectionEvent, LifecycleQueue, LifecycleSender},
    math::Point,
    snapshot::{DefaultSnapshotTranslator, SnapshotTranslator},
    transport::{ReliableConn, ReliableListener, ReliableWriter, UnreliableConn},
    wire::{Action, ClientId, NetMsg},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::SessionRegistry;

/// A decoded message arriving on a client's reliable channel after the
/// handshake completes, or a notification that the channel closed.
enum ReliableEvent {
    Message(ClientId, NetMsg),
    Closed(ClientId),
}

/// Per-client server-side state. Owned exclusively by `GameServer`; only the
/// spawned reader task and the session registry are shared across tasks.
struct ClientState {
    writer: ReliableWriter,
    player_entity: Option<EntityId>,
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    session_registry: Arc<SessionRegistry>,
    current_level: Arc<RwLock<LevelDef>>,

    udp: UnreliableConn,
    local_addr: SocketAddr,

    clients: HashMap<ClientId, ClientState>,
    accepted_rx: mpsc::UnboundedReceiver<(ClientId, ReliableWriter)>,
    reliable_rx: mpsc::UnboundedReceiver<ReliableEvent>,

    /// Address of the datagram currently being dispatched; set immediately
    /// before `dispatch` runs the handler for one message so the
    /// `RegisterUdp` handler can bind it to a client id. `Dispatcher<Ctx>`
    /// only carries the decoded message, not transport metadata, so this
    /// field is the seam that supplies it.
    pending_addr: SocketAddr,
    datagram_dispatcher: Dispatcher<GameServer>,
    reliable_dispatcher: Dispatcher<GameServer>,

    world: World,
    level_catalog: Box<dyn LevelCatalog>,
    controller: Box<dyn EntityController>,
    pending_inputs: Vec<(ClientId, Action, Point)>,

    tick: u64,
    /// Builds outbound snapshots; swappable via `set_snapshot_translator` (the
    /// `Handle::set_snapshot_translator` seam from spec §6), defaulting to
    /// the plain `TickGuard`-backed implementation.
    translator: Box<dyn SnapshotTranslator>,
    /// Emit a snapshot every Nth simulation tick (derived from tick_hz / snapshot_hz).
    snapshot_every: u32,

    lifecycle_tx: LifecycleSender,
    /// Taken exactly once by a host-facing wrapper (e.g. `Handle`) via
    /// `take_lifecycle`; `None` afterwards.
    lifecycle_rx: Option<LifecycleQueue>,
}

impl GameServer {
    /// Creates a new server bound to `cfg.socket_addr()`.
    pub async fn new(cfg: EngineConfig, level_catalog: Box<dyn LevelCatalog>) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.socket_addr().parse().context("parse server address")?;
        let tcp = ReliableListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;
        let udp = UnreliableConn::bind(local_addr).await.context("udp bind")?;

        Self::from_parts(cfg, tcp, udp, local_addr, level_catalog)
    }

    fn from_parts(
        cfg: EngineConfig,
        tcp: ReliableListener,
        udp: UnreliableConn,
        local_addr: SocketAddr,
        level_catalog: Box<dyn LevelCatalog>,
    ) -> anyhow::Result<Self> {
        let session_registry = Arc::new(SessionRegistry::new());
        let current_level = Arc::new(RwLock::new(level_catalog.current().clone()));

        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let (reliable_tx, reliable_rx) = mpsc::unbounded_channel();

        tokio::spawn(accept_loop(tcp, session_registry.clone(), current_level.clone(), accepted_tx, reliable_tx));

        let snapshot_every = (cfg.tick_hz / cfg.snapshot_hz.max(1)).max(1);
        let (lifecycle_tx, lifecycle_rx) = LifecycleQueue::channel();

        Ok(Self {
            cfg,
            session_registry,
            current_level,
            udp,
            local_addr,
            clients: HashMap::new(),
            accepted_rx,
            reliable_rx,
            pending_addr: local_addr,
            datagram_dispatcher: build_datagram_dispatcher(),
            reliable_dispatcher: build_reliable_dispatcher(),
            world: World::default(),
            level_catalog,
            controller: Box::new(SimController::default()),
            pending_inputs: Vec::new(),
            tick: 0,
            translator: Box::new(DefaultSnapshotTranslator::new()),
            snapshot_every,
            lifecycle_tx,
            lifecycle_rx: Some(lifecycle_rx),
        })
    }

    /// Installs a custom snapshot translator, replacing the default
    /// `TickGuard`-backed one. Per spec §6's `setSnapshotTranslator`; must be
    /// called, if at all, before the tick loop starts broadcasting.
    pub fn set_snapshot_translator(&mut self, translator: Box<dyn SnapshotTranslator>) {
        self.translator = translator;
    }

    /// Takes the connection-lifecycle receiver. Callable exactly once — a
    /// host-facing wrapper (`Handle`) takes it at construction time, before
    /// handing the server off to its dedicated tick task, since the queue
    /// itself is independent of `GameServer`'s ownership.
    pub fn take_lifecycle(&mut self) -> LifecycleQueue {
        self.lifecycle_rx.take().expect("lifecycle queue already taken")
    }

    /// Binds to an ephemeral port with a single default level, for tests.
    pub async fn bind_ephemeral() -> anyhow::Result<Self> {
        let cfg = EngineConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST).to_string(),
            port: 0,
            ..Default::default()
        };
        let catalog = Box::new(SequentialLevelCatalog::single("maze", Point::ZERO));
        Self::new(cfg, catalog).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Names of every entity currently in the world.
    pub fn entity_names(&self) -> Vec<EntityName> {
        self.world.iter_names().map(|(n, _)| n.clone()).collect()
    }

    pub fn position_of(&self, client_id: ClientId) -> Option<Point> {
        let client = self.clients.get(&client_id)?;
        let entity = client.player_entity?;
        self.world.get::<Position>(entity).map(|p| p.0)
    }

    /// Runs the server for a number of fixed-rate ticks (test/CLI helper).
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = std::time::Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = tokio::time::Instant::now();
        for _ in 0..ticks {
            next += dt;
            self.step().await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step: drain newly-accepted connections,
    /// drain pending reliable/datagram messages, reconcile sessions against
    /// the world, apply drained inputs, advance the simulation, and
    /// periodically broadcast a snapshot.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        self.drain_accepted();
        self.drain_reliable_events();
        self.drain_datagrams();

        self.reconcile_sessions();
        self.apply_inputs();
        self.simulate();

        if self.tick % self.snapshot_every as u64 == 0 {
            self.broadcast_snapshot().await?;
        }

        self.tick += 1;
        Ok(())
    }

    fn drain_accepted(&mut self) {
        while let Ok((id, writer)) = self.accepted_rx.try_recv() {
            self.clients.insert(id, ClientState { writer, player_entity: None });
            info!(client_id = ?id, "client connected");
            let _ = self.lifecycle_tx.send(ConnectionEvent::Connected { client_id: id });
        }
    }

    fn drain_reliable_events(&mut self) {
        let mut events = Vec::new();
        while let Ok(event) = self.reliable_rx.try_recv() {
            events.push(event);
        }
        for event in events {
            match event {
                ReliableEvent::Message(_id, msg) => self.reliable_dispatcher.dispatch(self, msg),
                ReliableEvent::Closed(id) => self.on_reliable_closed(id),
            }
        }
    }

    fn on_reliable_closed(&mut self, id: ClientId) {
        info!(client_id = ?id, "client disconnected");
        self.session_registry.drop_client(id);
        self.clients.remove(&id);
        let _ = self.lifecycle_tx.send(ConnectionEvent::Disconnected { client_id: id, reason: None });
        // The orphaned entity is removed on the *next* reconcile pass, not
        // here, matching "within a tick or two the entity disappears".
    }

    fn drain_datagrams(&mut self) {
        loop {
            match self.udp.try_recv() {
                Ok(Some((msg, from))) => {
                    self.pending_addr = from;
                    self.datagram_dispatcher.dispatch(self, msg);
                }
                Ok(None) => break,
                Err(e) => warn!(error = %e, "datagram decode/recv error, dropping"),
            }
        }
    }

    fn on_register_udp(&mut self, client_id: ClientId) {
        let addr = self.pending_addr;
        if self.session_registry.register_datagram(client_id, addr) {
            debug!(client_id = ?client_id, %addr, "datagram address registered");
        } else {
            warn!(client_id = ?client_id, %addr, "RegisterUdp for inactive client id, dropping");
        }
    }

    fn on_input(&mut self, client_id: ClientId, action: Action, point: Point) {
        self.pending_inputs.push((client_id, action, point));
    }

    fn on_request_entity_spawn(&mut self, entity_name: EntityName) {
        debug!(entity = %entity_name, "entity spawn request received (handled by gameplay collaborator, not this core)");
    }

    /// Spawns a world entity for every active session lacking one, and
    /// removes world entities whose owning client is gone. Session/client
    /// bookkeeping is mutated by I/O reception (registry accept, the reader
    /// task's disconnect notification); this runs after draining that tick's
    /// I/O events, so it always sees an up-to-date `self.clients`.
    fn reconcile_sessions(&mut self) {
        let live_ids: Vec<ClientId> = self.clients.keys().copied().collect();
        let start = self.level_catalog.current().start_tile;

        for id in &live_ids {
            if self.clients[id].player_entity.is_some() {
                continue;
            }
            let name = EntityName::from(format!("hero_{}", id.0));
            let entity = self.world.spawn_named(name);
            self.world.insert(entity, Position(start));
            self.clients.get_mut(id).unwrap().player_entity = Some(entity);
            info!(client_id = ?id, entity = ?entity, "player entity spawned");
        }

        let orphaned: Vec<EntityName> = self
            .world
            .iter_names()
            .filter(|(name, _)| {
                client_id_from_entity_name(name).is_some_and(|owner| !live_ids.contains(&owner))
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in orphaned {
            self.world.remove_named(&name);
            info!(entity = %name, "stale entity removed");
        }
    }

    fn apply_inputs(&mut self) {
        let inputs = std::mem::take(&mut self.pending_inputs);
        for (client_id, action, point) in inputs {
            let Some(entity) = self.clients.get(&client_id).and_then(|c| c.player_entity) else {
                continue;
            };
            match action {
                Action::Move => self.controller.apply_move(&mut self.world, entity, point),
                Action::MovePath => self.controller.follow_path(&mut self.world, entity, point),
                Action::CastSkill => self.controller.cast_skill(&mut self.world, entity, point),
                Action::Interact => self.controller.interact(&mut self.world, entity, point),
            }
        }
    }

    fn simulate(&mut self) {
        // Placeholder seam for deterministic systems beyond per-input
        // controller calls (status effects, AI); none are in scope yet.
    }

    async fn broadcast_snapshot(&mut self) -> anyhow::Result<()> {
        let Some(snapshot) = self.translator.build(self.tick, &self.world) else {
            return Ok(());
        };
        let peers = self.session_registry.datagram_peers();
        let msg = NetMsg::Snapshot(snapshot);
        for (_, addr) in peers {
            if let Err(e) = self.udp.send_to(&msg, addr).await {
                warn!(%addr, error = %e, "failed to send snapshot");
            }
        }
        Ok(())
    }

    /// Loads the next level and broadcasts `LevelChange`/`GameOver` to every
    /// connected client's reliable channel.
    pub async fn advance_level(&mut self) -> anyhow::Result<()> {
        match self.level_catalog.advance() {
            LevelTransition::Loaded(def) => {
                *self.current_level.write().expect("level lock poisoned") = def.clone();
                let msg = NetMsg::LevelChange { level_name: def.name.clone(), spawn_point: Some(def.start_tile) };
                self.broadcast_reliable(&msg).await;
            }
            LevelTransition::Exhausted => {
                self.broadcast_reliable(&NetMsg::GameOver).await;
            }
        }
        Ok(())
    }

    async fn broadcast_reliable(&mut self, msg: &NetMsg) {
        for (id, client) in self.clients.iter_mut() {
            if let Err(e) = client.writer.send(msg).await {
                warn!(client_id = ?id, error = %e, "failed to send reliable broadcast");
            }
        }
    }
}

fn client_id_from_entity_name(name: &EntityName) -> Option<ClientId> {
    name.0.strip_prefix("hero_").and_then(|s| s.parse().ok()).map(ClientId)
}

fn build_datagram_dispatcher() -> Dispatcher<GameServer> {
    let mut d = Dispatcher::new();
    d.register(MsgTag::RegisterUdp, |server, msg| {
        if let NetMsg::RegisterUdp { client_id } = msg {
            server.on_register_udp(client_id);
        }
    });
    d.register(MsgTag::Input, |server, msg| {
        if let NetMsg::Input { client_id, action, point } = msg {
            server.on_input(client_id, action, point);
        }
    });
    d
}

fn build_reliable_dispatcher() -> Dispatcher<GameServer> {
    let mut d = Dispatcher::new();
    d.register(MsgTag::RequestEntitySpawn, |server, msg| {
        if let NetMsg::RequestEntitySpawn { entity_name } = msg {
            server.on_request_entity_spawn(entity_name);
        }
    });
    d
}

/// Accepts connections in a loop, performing the reliable-channel handshake
/// inline and then spawning a dedicated inbound pipeline task per connection
/// whose only job is to decode frames and deliver them for dispatch.
async fn accept_loop(
    listener: ReliableListener,
    session_registry: Arc<SessionRegistry>,
    current_level: Arc<RwLock<LevelDef>>,
    accepted_tx: mpsc::UnboundedSender<(ClientId, ReliableWriter)>,
    reliable_tx: mpsc::UnboundedSender<ReliableEvent>,
) {
    loop {
        let (conn, _peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let registry = session_registry.clone();
        let level = current_level.clone();
        let accepted_tx = accepted_tx.clone();
        let reliable_tx = reliable_tx.clone();
        tokio::spawn(async move {
            handle_connection(conn, registry, level, accepted_tx, reliable_tx).await;
        });
    }
}

async fn handle_connection(
    mut conn: ReliableConn,
    session_registry: Arc<SessionRegistry>,
    current_level: Arc<RwLock<LevelDef>>,
    accepted_tx: mpsc::UnboundedSender<(ClientId, ReliableWriter)>,
    reliable_tx: mpsc::UnboundedSender<ReliableEvent>,
) {
    let msg = match conn.recv().await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "handshake read failed before ConnectRequest");
            return;
        }
    };

    let player_name = match msg {
        NetMsg::ConnectRequest { player_name } => player_name,
        other => {
            warn!(?other, "expected ConnectRequest as first message, dropping connection");
            return;
        }
    };

    let client_id = match session_registry.accept(&player_name) {
        Ok(id) => id,
        Err(reason) => {
            let reject = NetMsg::ConnectReject { reason: reason.message() };
            let _ = conn.send(&reject).await;
            info!(name = %player_name, reason = ?reason, "connect rejected");
            return;
        }
    };

    if conn.send(&NetMsg::ConnectAck { client_id }).await.is_err() {
        session_registry.drop_client(client_id);
        return;
    }

    let level = current_level.read().expect("level lock poisoned").clone();
    let level_change = NetMsg::LevelChange { level_name: level.name, spawn_point: Some(level.start_tile) };
    if conn.send(&level_change).await.is_err() {
        session_registry.drop_client(client_id);
        return;
    }

    let (mut reader, writer) = conn.into_split();
    if accepted_tx.send((client_id, writer)).is_err() {
        session_registry.drop_client(client_id);
        return;
    }

    loop {
        match reader.recv().await {
            Ok(msg) => {
                if reliable_tx.send(ReliableEvent::Message(client_id, msg)).is_err() {
                    break;
                }
            }
            Err(_) => {
                let _ = reliable_tx.send(ReliableEvent::Closed(client_id));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_shared::transport::UnreliableConn as ClientUdp;

    async fn connect_client(addr: SocketAddr, name: &str) -> anyhow::Result<(ReliableConn, ClientId)> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        let mut conn = ReliableConn::new(stream);
        conn.send(&NetMsg::ConnectRequest { player_name: name.to_string() }).await?;
        let ack = conn.recv().await?;
        let client_id = match ack {
            NetMsg::ConnectAck { client_id } => client_id,
            other => anyhow::bail!("expected ConnectAck, got {other:?}"),
        };
        let level_change = conn.recv().await?;
        assert!(matches!(level_change, NetMsg::LevelChange { .. }));
        Ok((conn, client_id))
    }

    #[tokio::test]
    async fn handshake_assigns_client_and_spawns_entity_within_a_tick() -> anyhow::Result<()> {
        let mut server = GameServer::bind_ephemeral().await?;
        let addr = server.local_addr();

        let (_conn, client_id) = connect_client(addr, "Alice").await?;

        server.step().await?;
        assert_eq!(server.entity_names(), vec![EntityName::from(format!("hero_{}", client_id.0))]);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_over_the_wire() -> anyhow::Result<()> {
        let mut server = GameServer::bind_ephemeral().await?;
        let addr = server.local_addr();

        let (_first_conn, _id) = connect_client(addr, "Alice").await?;
        server.step().await?;

        let stream = tokio::net::TcpStream::connect(addr).await?;
        let mut second = ReliableConn::new(stream);
        second.send(&NetMsg::ConnectRequest { player_name: "Alice".to_string() }).await?;
        let reply = second.recv().await?;
        assert!(matches!(reply, NetMsg::ConnectReject { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn move_input_advances_entity_position_over_several_ticks() -> anyhow::Result<()> {
        let mut server = GameServer::bind_ephemeral().await?;
        let addr = server.local_addr();

        let (conn, client_id) = connect_client(addr, "Alice").await?;
        server.step().await?;

        let server_udp = server.udp.local_addr()?;
        let client_udp = ClientUdp::connect(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0), server_udp).await?;
        client_udp.send(&NetMsg::RegisterUdp { client_id }).await?;
        server.step().await?;

        for _ in 0..5 {
            client_udp
                .send(&NetMsg::Input { client_id, action: Action::Move, point: Point::new(1.0, 0.0) })
                .await?;
            server.step().await?;
        }

        let pos = server.position_of(client_id).expect("entity exists");
        assert!(pos.x > 0.0, "expected the entity to have moved, got {pos:?}");
        drop(conn);
        Ok(())
    }

    #[tokio::test]
    async fn disconnect_removes_entity_within_two_ticks() -> anyhow::Result<()> {
        let mut server = GameServer::bind_ephemeral().await?;
        let addr = server.local_addr();

        let (conn, client_id) = connect_client(addr, "Alice").await?;
        server.step().await?;
        assert!(!server.entity_names().is_empty());

        drop(conn);
        // Give the reader task a chance to observe EOF and notify the tick loop.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        server.step().await?;
        server.step().await?;

        let expected = EntityName::from(format!("hero_{}", client_id.0));
        assert!(!server.entity_names().contains(&expected));
        Ok(())
    }
}
