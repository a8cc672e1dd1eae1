//! Message dispatcher.
//!
//! Maps a message variant to at most one handler. Registration replaces any
//! previous handler for the same variant. Dispatch is only ever invoked on
//! the game-loop thread during the poll-and-dispatch step — I/O tasks enqueue
//! messages, they never call into handlers directly.

use std::collections::HashMap;

use tracing::info;

use crate::wire::NetMsg;

/// Stable tag identifying a `NetMsg` variant, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgTag {
    ConnectRequest,
    RegisterUdp,
    Input,
    RequestEntitySpawn,
    ConnectAck,
    ConnectReject,
    LevelChange,
    EntitySpawnEvent,
    Snapshot,
    GameOver,
}

impl MsgTag {
    pub fn of(msg: &NetMsg) -> Self {
        match msg {
            NetMsg::ConnectRequest { .. } => MsgTag::ConnectRequest,
            NetMsg::RegisterUdp { .. } => MsgTag::RegisterUdp,
            NetMsg::Input { .. } => MsgTag::Input,
            NetMsg::RequestEntitySpawn { .. } => MsgTag::RequestEntitySpawn,
            NetMsg::ConnectAck { .. } => MsgTag::ConnectAck,
            NetMsg::ConnectReject { .. } => MsgTag::ConnectReject,
            NetMsg::LevelChange { .. } => MsgTag::LevelChange,
            NetMsg::EntitySpawnEvent { .. } => MsgTag::EntitySpawnEvent,
            NetMsg::Snapshot(_) => MsgTag::Snapshot,
            NetMsg::GameOver => MsgTag::GameOver,
        }
    }
}

type Handler<Ctx> = Box<dyn FnMut(&mut Ctx, NetMsg) + Send>;

/// Single-consumer dispatcher: one handler per message variant, invoked
/// exclusively on the game-loop thread.
pub struct Dispatcher<Ctx> {
    handlers: HashMap<MsgTag, Handler<Ctx>>,
}

impl<Ctx> Default for Dispatcher<Ctx> {
    fn default() -> Self {
        Self { handlers: HashMap::new() }
    }
}

impl<Ctx> Dispatcher<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `tag`, replacing any previous registration.
    pub fn register(&mut self, tag: MsgTag, handler: impl FnMut(&mut Ctx, NetMsg) + Send + 'static) {
        self.handlers.insert(tag, Box::new(handler));
    }

    /// Dispatches one message. Unhandled variants are logged at info level
    /// and dropped.
    pub fn dispatch(&mut self, ctx: &mut Ctx, msg: NetMsg) {
        let tag = MsgTag::of(&msg);
        match self.handlers.get_mut(&tag) {
            Some(handler) => handler(ctx, msg),
            None => info!(?tag, "unhandled message variant, dropping"),
        }
    }

    /// Drains and dispatches a batch of messages in order.
    pub fn dispatch_all(&mut self, ctx: &mut Ctx, msgs: impl IntoIterator<Item = NetMsg>) {
        for msg in msgs {
            self.dispatch(ctx, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ClientId;

    #[test]
    fn registration_replaces_previous_handler() {
        let mut dispatcher: Dispatcher<Vec<u32>> = Dispatcher::new();
        dispatcher.register(MsgTag::ConnectAck, |ctx, _| ctx.push(1));
        dispatcher.register(MsgTag::ConnectAck, |ctx, _| ctx.push(2));

        let mut ctx = Vec::new();
        dispatcher.dispatch(&mut ctx, NetMsg::ConnectAck { client_id: ClientId(1) });
        assert_eq!(ctx, vec![2]);
    }

    #[test]
    fn unhandled_variant_is_dropped_without_panicking() {
        let mut dispatcher: Dispatcher<()> = Dispatcher::new();
        dispatcher.dispatch(&mut (), NetMsg::GameOver);
    }
}
