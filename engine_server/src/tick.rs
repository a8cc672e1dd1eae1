//! Fixed-rate tick scheduler.
//!
//! Drives `GameServer::step` at `cfg.tick_hz`, using `tokio::time::sleep_until`
//! against an accumulating deadline rather than a plain `sleep` so a slow tick
//! does not compound drift into every subsequent one. A tick that overruns its
//! budget is logged and the next deadline is computed from the overrun tick's
//! start, not from "now" — this lets the loop catch up instead of silently
//! free-running faster than `tick_hz` after a stall.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::server::GameServer;

/// Runs the server loop until the process is signalled to stop (this never
/// returns on success; the binary's `main` owns shutdown via ctrl-c).
pub async fn run(server: &mut GameServer) -> anyhow::Result<()> {
    let period = Duration::from_secs_f32(1.0 / server.cfg.tick_hz.max(1) as f32);
    let mut deadline = Instant::now() + period;

    loop {
        server.step().await?;

        let now = Instant::now();
        if now > deadline {
            warn!(
                tick = server.tick_count(),
                overrun_ms = (now - deadline).as_millis(),
                "tick overran its budget"
            );
            deadline = now + period;
        } else {
            tokio::time::sleep_until(deadline).await;
            deadline += period;
        }
    }
}
