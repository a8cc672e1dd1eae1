//! Integration tests for the `engine_handle::Handle` façade: the uniform
//! start/stop/poll/send surface a host game loop would actually call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_handle::Handle;
use engine_shared::{
    ecs::World,
    lifecycle::ConnectionEvent,
    snapshot::{DefaultSnapshotTranslator, SnapshotTranslator},
    wire::{Action, Snapshot},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").with_test_writer().try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_client_handle_connects_and_sees_a_snapshot() -> anyhow::Result<()> {
    init_tracing();

    let mut server_handle = Handle::new(true, "127.0.0.1", 0, "unused").await?;
    let addr = server_handle.local_addr().expect("server handle binds a socket");
    server_handle.start().await?;

    let mut client_handle = Handle::new(false, &addr.ip().to_string(), addr.port(), "Alice").await?;
    client_handle.start().await?;

    // Drive a few frames like a host game loop would.
    for _ in 0..40 {
        client_handle.poll().await?;
        server_handle.poll().await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client_handle.send_input(Action::Move, engine_shared::math::Point::new(1.0, 0.0)).await?;

    server_handle.stop().await;
    client_handle.stop().await;
    Ok(())
}

/// A translator that counts how many times `build`/`apply` ran, wrapping the
/// default behavior rather than replacing it — exercises
/// `Handle::set_snapshot_translator` as the seam spec §6 describes.
struct CountingTranslator {
    inner: DefaultSnapshotTranslator,
    applies: Arc<AtomicU32>,
}

impl SnapshotTranslator for CountingTranslator {
    fn build(&mut self, tick: u64, world: &World) -> Option<Snapshot> {
        self.inner.build(tick, world)
    }

    fn apply(&mut self, snapshot: &Snapshot, mirror: &mut World) -> bool {
        let applied = self.inner.apply(snapshot, mirror);
        if applied {
            self.applies.fetch_add(1, Ordering::SeqCst);
        }
        applied
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_custom_snapshot_translator_observes_every_applied_snapshot() -> anyhow::Result<()> {
    init_tracing();

    let mut server_handle = Handle::new(true, "127.0.0.1", 0, "unused").await?;
    let addr = server_handle.local_addr().expect("server handle binds a socket");
    server_handle.start().await?;

    let applies = Arc::new(AtomicU32::new(0));
    let mut client_handle = Handle::new(false, &addr.ip().to_string(), addr.port(), "Alice").await?;
    client_handle.set_snapshot_translator(Box::new(CountingTranslator {
        inner: DefaultSnapshotTranslator::new(),
        applies: applies.clone(),
    }));
    client_handle.start().await?;

    for _ in 0..40 {
        client_handle.poll().await?;
        server_handle.poll().await?;
        if applies.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(applies.load(Ordering::SeqCst) > 0, "custom translator should have observed at least one snapshot");

    server_handle.stop().await;
    client_handle.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_is_observed_through_the_handle_listener() -> anyhow::Result<()> {
    init_tracing();

    let mut server_handle = Handle::new(true, "127.0.0.1", 0, "unused").await?;
    let addr = server_handle.local_addr().expect("server handle binds a socket");

    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    let events_clone = events.clone();
    server_handle.add_connection_listener(move |event| events_clone.lock().unwrap().push(event));
    server_handle.start().await?;

    {
        let mut client_handle = Handle::new(false, &addr.ip().to_string(), addr.port(), "Alice").await?;
        client_handle.start().await?;
        for _ in 0..10 {
            client_handle.poll().await?;
            server_handle.poll().await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Dropping the client handle closes its reliable connection.
    }

    let mut saw_disconnect = false;
    for _ in 0..40 {
        server_handle.poll().await?;
        if events.lock().unwrap().iter().any(|e| matches!(e, ConnectionEvent::Disconnected { .. })) {
            saw_disconnect = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_disconnect, "server handle should observe the client disconnecting");

    server_handle.stop().await;
    Ok(())
}
