//! `engine_server`
//!
//! Server-side systems:
//! - Session registry (client id allocation, name validation, datagram binding)
//! - Fixed timestep simulation loop (`tick`)
//! - The authoritative `GameServer` itself: accept handshake, per-connection
//!   inbound pipeline, session reconciliation, input application, snapshot
//!   broadcast
//!
//! Networking model:
//! - TCP: handshake/control plane, each connection split into an owned
//!   reader task and a writer kept by the game loop
//! - UDP: gameplay plane (input/snapshots), shared one socket per server

pub mod server;
pub mod session;
pub mod tick;

pub use server::GameServer;
