//! Session registry.
//!
//! Assigns monotonically increasing client ids on reliable-channel accept,
//! validates and remembers player names, learns per-client datagram return
//! addresses, and purges state when a reliable connection closes.
//!
//! The three maps are written only by I/O reception; every reader takes an
//! immutable snapshot copy rather than holding a lock across its own work,
//! so a registry mutation observed by the tick loop happens-before the next
//! reconcile step without the tick loop ever blocking on I/O.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use engine_shared::wire::ClientId;

/// Rejection reasons for a connect request, surfaced to the client as
/// `NetMsg::ConnectReject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidName(String),
    NameTaken(String),
}

impl RejectReason {
    pub fn message(&self) -> String {
        match self {
            RejectReason::InvalidName(name) => {
                format!("Invalid player name. '{name}' must be non-empty and must not contain '_'.")
            }
            RejectReason::NameTaken(name) => format!("Player name '{name}' is already in use."),
        }
    }
}

/// Server-side binding of client id, player name, and (once registered)
/// datagram return address.
#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU32,
    names: RwLock<HashMap<ClientId, String>>,
    datagram_addrs: RwLock<HashMap<ClientId, SocketAddr>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { next_id: AtomicU32::new(1), ..Default::default() }
    }

    /// Validates a player name's shape: non-empty, no underscore. The
    /// underscore restriction is reserved for future duplicate-name
    /// disambiguation and is enforced even though nothing yet uses it.
    /// Uniqueness is *not* checked here — that must happen atomically with
    /// the insert, under the same write lock, so two concurrent handshakes
    /// for the same name can't both observe "not taken" (see `accept`).
    fn validate_name_shape(name: &str) -> Result<(), RejectReason> {
        if name.is_empty() || name.contains('_') {
            return Err(RejectReason::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Validates the name and, on success, allocates the next client id and
    /// binds it to the name. The datagram address is left unbound until the
    /// client's first `RegisterUdp`.
    ///
    /// The uniqueness check and the insert happen under a single `names`
    /// write-lock acquisition so two concurrent connects for the same name
    /// (the handshake runs on its own per-connection task) can't both pass
    /// the check before either inserts — otherwise both would be accepted
    /// with the same `PlayerName`, violating spec invariant 1.
    pub fn accept(&self, name: &str) -> Result<ClientId, RejectReason> {
        Self::validate_name_shape(name)?;

        let mut names = self.names.write().expect("names lock poisoned");
        if names.values().any(|existing| existing == name) {
            return Err(RejectReason::NameTaken(name.to_string()));
        }
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        names.insert(id, name.to_string());
        Ok(id)
    }

    /// Registers a datagram return address for `client_id`, but only if that
    /// id currently maps to an active session. Overwrites any previous
    /// address for that client.
    pub fn register_datagram(&self, client_id: ClientId, addr: SocketAddr) -> bool {
        if !self.names.read().expect("names lock poisoned").contains_key(&client_id) {
            return false;
        }
        self.datagram_addrs.write().expect("datagram lock poisoned").insert(client_id, addr);
        true
    }

    /// Removes all state for `client_id` (reliable channel closed).
    pub fn drop_client(&self, client_id: ClientId) {
        self.names.write().expect("names lock poisoned").remove(&client_id);
        self.datagram_addrs.write().expect("datagram lock poisoned").remove(&client_id);
    }

    /// Immutable snapshot of every client currently bound to an active
    /// reliable handle (used by the tick loop's reconcile step).
    pub fn active_clients(&self) -> Vec<ClientId> {
        self.names.read().expect("names lock poisoned").keys().copied().collect()
    }

    /// Immutable snapshot used by snapshot broadcast: only clients that have
    /// completed datagram registration (the BOUND state) are included.
    pub fn datagram_peers(&self) -> Vec<(ClientId, SocketAddr)> {
        self.datagram_addrs
            .read()
            .expect("datagram lock poisoned")
            .iter()
            .map(|(id, addr)| (*id, *addr))
            .collect()
    }

    pub fn name_of(&self, client_id: ClientId) -> Option<String> {
        self.names.read().expect("names lock poisoned").get(&client_id).cloned()
    }

    pub fn is_bound(&self, client_id: ClientId) -> bool {
        self.datagram_addrs.read().expect("datagram lock poisoned").contains_key(&client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_positive_and_monotonic() {
        let registry = SessionRegistry::new();
        let a = registry.accept("Alice").unwrap();
        let b = registry.accept("Bob").unwrap();
        assert!(a.0 > 0);
        assert!(b.0 > a.0);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = SessionRegistry::new();
        registry.accept("Alice").unwrap();
        assert_eq!(
            registry.accept("Alice").unwrap_err(),
            RejectReason::NameTaken("Alice".into())
        );
    }

    #[test]
    fn underscore_in_name_is_rejected() {
        let registry = SessionRegistry::new();
        assert!(matches!(registry.accept("bad_name"), Err(RejectReason::InvalidName(_))));
    }

    #[test]
    fn register_datagram_requires_active_session() {
        let registry = SessionRegistry::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert!(!registry.register_datagram(ClientId(999), addr));

        let id = registry.accept("Alice").unwrap();
        assert!(registry.register_datagram(id, addr));
        assert_eq!(registry.datagram_peers(), vec![(id, addr)]);
    }

    #[test]
    fn drop_client_removes_from_every_map() {
        let registry = SessionRegistry::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let id = registry.accept("Alice").unwrap();
        registry.register_datagram(id, addr);

        registry.drop_client(id);

        assert!(registry.datagram_peers().is_empty());
        assert!(registry.name_of(id).is_none());
        // A dropped name becomes available again.
        assert!(registry.accept("Alice").is_ok());
    }
}
