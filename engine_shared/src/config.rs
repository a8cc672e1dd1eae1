//! Configuration system.
//!
//! Loads engine configuration from JSON strings (file IO and CLI flag
//! parsing stay in the two binaries; this core only knows about the
//! resulting struct).

use serde::{Deserialize, Serialize};

/// Default shared TCP+UDP port (spec default, distinct per deployment).
pub const DEFAULT_PORT: u16 = 7777;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server host/address to bind (server) or connect to (client).
    pub host: String,
    /// Shared TCP+UDP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fixed simulation tick rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Snapshot broadcast rate (server only).
    #[serde(default = "default_snapshot_hz")]
    pub snapshot_hz: u32,
    /// Player name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_tick_hz() -> u32 {
    20
}

fn default_snapshot_hz() -> u32 {
    20
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_port(),
            tick_hz: default_tick_hz(),
            snapshot_hz: default_snapshot_hz(),
            player_name: default_player_name(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
