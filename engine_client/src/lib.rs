//! `engine_client`
//!
//! Client-side systems:
//! - Connection handshake and lifecycle (reliable + unreliable channels)
//! - Input sampling and per-frame action selection
//! - Snapshot application onto a local mirror world, plus short-horizon
//!   interpolation for rendering between the last two snapshots

pub mod client;
pub mod input;
pub mod interp;

pub use client::GameClient;
