//! `engine_handle`
//!
//! The host-process-facing startup surface named in spec §6: a single
//! constructor that accepts `(is_server, host, port, player_name)` and
//! returns one `Handle` exposing `start`/`stop`/`poll`/`send_input`/`send`/
//! `add_connection_listener`/`set_snapshot_translator`, so an embedding game
//! loop does not need two different integration paths for "I am the server"
//! versus "I am a client". Everything here is a thin façade over
//! `engine_client::GameClient` and `engine_server::GameServer`; the transport
//! and authority logic lives in those crates.

use std::net::SocketAddr;

use anyhow::Context;
use engine_client::client::GameClient;
use engine_server::{server::GameServer, tick};
use engine_shared::{
    config::EngineConfig,
    level::SequentialLevelCatalog,
    lifecycle::{ConnectionEvent, LifecycleQueue},
    math::Point,
    snapshot::SnapshotTranslator,
    wire::{Action, NetMsg},
};
use tokio::task::JoinHandle;
use tracing::warn;

type Listener = Box<dyn FnMut(ConnectionEvent) + Send>;

/// Which role this process is playing. Not exposed directly — callers only
/// see `Handle`'s uniform method surface.
enum Mode {
    Client(GameClient),
    Server {
        /// `Some` until `start()` hands the server off to its dedicated tick
        /// task; `None` afterwards (the task owns it for the rest of the
        /// process's life).
        server: Option<GameServer>,
        tick_task: Option<JoinHandle<()>>,
        /// Taken from the server at construction time, before it can be
        /// moved into the tick task, since the queue itself doesn't need to
        /// live inside `GameServer`.
        lifecycle: LifecycleQueue,
        /// Captured at bind time so it stays readable after `start()` moves
        /// the server itself into its tick task.
        local_addr: SocketAddr,
    },
}

/// Uniform handle returned by `Handle::new`. See spec §6.
pub struct Handle {
    mode: Mode,
    listeners: Vec<Listener>,
    started: bool,
}

impl Handle {
    /// Binds (server) or connects (client) immediately; does not yet begin
    /// background execution — call `start()` once listeners/translator are
    /// configured.
    pub async fn new(is_server: bool, host: &str, port: u16, player_name: &str) -> anyhow::Result<Self> {
        let cfg = EngineConfig {
            host: host.to_string(),
            port,
            player_name: player_name.to_string(),
            ..Default::default()
        };

        let mode = if is_server {
            let catalog = Box::new(SequentialLevelCatalog::single("maze", Point::ZERO));
            let mut server = GameServer::new(cfg, catalog).await.context("bind server")?;
            let lifecycle = server.take_lifecycle();
            let local_addr = server.local_addr();
            Mode::Server { server: Some(server), tick_task: None, lifecycle, local_addr }
        } else {
            let client = GameClient::connect(&cfg).await.context("connect client")?;
            Mode::Client(client)
        };

        Ok(Self { mode, listeners: Vec::new(), started: false })
    }

    /// Begins background execution: for the server, spawns the dedicated
    /// tick task (spec §4.F/§4.H start order: bind already happened in
    /// `new`, so this only starts ticking). For the client, the reliable
    /// handshake already completed in `new`/`GameClient::connect`, so this
    /// is a no-op beyond marking the handle started. Idempotent: a second
    /// call is a no-op with a warning, per spec §7's lifecycle-error rule.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.started {
            warn!("Handle::start called while already started, ignoring");
            return Ok(());
        }
        if let Mode::Server { server, tick_task, .. } = &mut self.mode {
            let mut owned = server.take().expect("server present before first start");
            *tick_task = Some(tokio::spawn(async move {
                if let Err(e) = tick::run(&mut owned).await {
                    warn!(error = %e, "server tick loop exited");
                }
            }));
        }
        self.started = true;
        Ok(())
    }

    /// Stops background execution. Idempotent: calling twice is
    /// indistinguishable from calling it once (spec §5/§8).
    pub async fn stop(&mut self) {
        if !self.started {
            warn!("Handle::stop called while already stopped, ignoring");
            return;
        }
        if let Mode::Server { tick_task, .. } = &mut self.mode {
            if let Some(task) = tick_task.take() {
                task.abort();
            }
        }
        self.started = false;
    }

    /// Drains lifecycle notifications to every registered listener, then
    /// (client only) drains inbound messages. The server's tick task owns
    /// its own per-tick I/O draining on its dedicated task; there is nothing
    /// left for the host's poll step to drive there beyond lifecycle
    /// delivery, matching spec §4.H's "executed exclusively by the game
    /// thread's poll step" for connection notifications specifically.
    pub async fn poll(&mut self) -> anyhow::Result<()> {
        match &mut self.mode {
            Mode::Client(client) => {
                client.poll().await?;
                for event in client.lifecycle.drain() {
                    for listener in &mut self.listeners {
                        listener(event.clone());
                    }
                }
            }
            Mode::Server { lifecycle, .. } => {
                for event in lifecycle.drain() {
                    for listener in &mut self.listeners {
                        listener(event.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Sends one input action. Client-only; the server has no input of its
    /// own to send.
    pub async fn send_input(&mut self, action: Action, point: Point) -> anyhow::Result<()> {
        match &mut self.mode {
            Mode::Client(client) => client.send_input(action, point).await,
            Mode::Server { .. } => anyhow::bail!("send_input is a client-only operation"),
        }
    }

    /// Sends an arbitrary reliable message (e.g. `RequestEntitySpawn`).
    /// Client-only for the same reason as `send_input`.
    pub async fn send(&mut self, msg: NetMsg) -> anyhow::Result<()> {
        match &mut self.mode {
            Mode::Client(client) => client.send_reliable(&msg).await,
            Mode::Server { .. } => anyhow::bail!("send is a client-only operation on this handle"),
        }
    }

    /// Registers a connection lifecycle observer. Notifications are enqueued
    /// from I/O tasks and delivered here only from `poll()`, on whatever
    /// thread the caller drives its own game loop from.
    pub fn add_connection_listener(&mut self, listener: impl FnMut(ConnectionEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// The bound address for a server handle; `None` for a client handle
    /// (which has no listening socket of its own). Useful for binding to
    /// port 0 and then discovering the ephemeral port actually assigned.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.mode {
            Mode::Server { local_addr, .. } => Some(*local_addr),
            Mode::Client(_) => None,
        }
    }

    /// Installs a custom snapshot translator in place of the default
    /// `TickGuard`-backed one. Must be called before `start()` for the
    /// server case: once the tick task owns the server, this handle can no
    /// longer reach it directly.
    pub fn set_snapshot_translator(&mut self, translator: Box<dyn SnapshotTranslator>) {
        match &mut self.mode {
            Mode::Client(client) => client.set_snapshot_translator(translator),
            Mode::Server { server: Some(server), .. } => server.set_snapshot_translator(translator),
            Mode::Server { server: None, .. } => {
                warn!("set_snapshot_translator called after the server tick task took ownership; ignored");
            }
        }
    }
}
