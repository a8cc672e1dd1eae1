//! Snapshot translator.
//!
//! Server side: builds per-tick snapshots from authoritative entity state.
//! Client side: applies received snapshots to a local mirror. Both directions
//! share the same monotonic server-tick guard so replay/reorder can never
//! move either side's view of the world backwards.
//!
//! The translator never touches game state from an I/O thread: building a
//! snapshot produces a pure message, and applying one is only ever called
//! from the game-thread dispatcher.

use tracing::{debug, warn};

use crate::ecs::{Animation, EntityName, Facing, Health, Position, Tint, World};
use crate::wire::{EntityState, Snapshot};

/// Enforces strictly-increasing server ticks with a wrap allowance near the
/// numeric maximum (spec §9: any threshold under 1% of the representable
/// range is acceptable).
#[derive(Debug, Clone, Copy)]
pub struct TickGuard {
    last: u64,
    wrap_threshold: u64,
}

impl Default for TickGuard {
    fn default() -> Self {
        // ~0.78% of u64::MAX, comfortably under the 1% ceiling.
        Self { last: 0, wrap_threshold: u64::MAX / 128 }
    }
}

impl TickGuard {
    pub fn new(wrap_threshold: u64) -> Self {
        Self { last: 0, wrap_threshold }
    }

    pub fn last_tick(&self) -> u64 {
        self.last
    }

    /// Returns true and advances `last` if `tick` may be applied/emitted.
    pub fn accept(&mut self, tick: u64) -> bool {
        let near_wrap = self.last >= u64::MAX - self.wrap_threshold;
        let accept = near_wrap || tick > self.last;
        if accept {
            self.last = tick;
        }
        accept
    }
}

/// Builds a snapshot from the current world state, guarded by `guard`.
/// Returns `None` if the tick is not strictly greater than the last emitted
/// tick (per the monotonic guard) or if there are no snapshot-eligible
/// entities. Entities without a position are skipped.
pub fn build_snapshot(guard: &mut TickGuard, tick: u64, world: &World) -> Option<Snapshot> {
    if !guard.accept(tick) {
        debug!(tick, last = guard.last_tick(), "dropping non-monotonic snapshot tick");
        return None;
    }

    let entities: Vec<EntityState> = world
        .iter_names()
        .filter_map(|(name, id)| {
            let position = world.get::<Position>(id)?.0;
            let mut state = EntityState::at(name.clone(), position);
            state.view_dir = world.get::<Facing>(id).map(|f| f.0);
            state.health = world.get::<Health>(id).map(|h| (h.current, h.max));
            state.animation = world.get::<Animation>(id).map(|a| a.0.clone());
            state.tint = world.get::<Tint>(id).map(|t| t.0);
            Some(state)
        })
        .collect();

    Some(Snapshot { server_tick: tick, entities })
}

/// Applies a received snapshot to a local mirror world, guarded by `guard`.
/// Returns true if the snapshot was applied. Entities absent from the local
/// store are logged and skipped (a future version may request a spawn via
/// `RequestEntitySpawn`).
pub fn apply_snapshot(guard: &mut TickGuard, snapshot: &Snapshot, mirror: &mut World) -> bool {
    if !guard.accept(snapshot.server_tick) {
        debug!(
            tick = snapshot.server_tick,
            last = guard.last_tick(),
            "dropping stale or duplicate snapshot"
        );
        return false;
    }

    for state in &snapshot.entities {
        let Some(id) = mirror.entity_by_name(&state.name) else {
            warn!(entity = %state.name, "snapshot references unknown entity, skipping");
            continue;
        };

        mirror.insert(id, Position(state.position));
        if let Some(dir) = state.view_dir {
            mirror.insert(id, Facing(dir));
        }
        if let Some((current, max)) = state.health {
            mirror.insert(id, Health { current, max });
        }
        if let Some(anim) = &state.animation {
            mirror.insert(id, Animation(anim.clone()));
        }
        if let Some(tint) = state.tint {
            mirror.insert(id, Tint(tint));
        }
    }

    true
}

/// Convenience: look up an entity's current position in the mirror by name.
pub fn position_of(world: &World, name: &EntityName) -> Option<crate::math::Point> {
    let id = world.entity_by_name(name)?;
    world.get::<Position>(id).map(|p| p.0)
}

/// Pluggable snapshot translator, the seam `Handle::set_snapshot_translator`
/// (spec §6) swaps out. `GameServer`/`GameClient` each hold one of these
/// instead of a bare `TickGuard` so a host process can install a custom
/// translator (e.g. one that filters fields by interest management) without
/// this core knowing about the override.
pub trait SnapshotTranslator: Send {
    fn build(&mut self, tick: u64, world: &World) -> Option<Snapshot>;
    fn apply(&mut self, snapshot: &Snapshot, mirror: &mut World) -> bool;
}

/// The translator every `GameServer`/`GameClient` uses unless a host
/// overrides it: a single `TickGuard` wrapping the free functions above.
pub struct DefaultSnapshotTranslator {
    guard: TickGuard,
}

impl DefaultSnapshotTranslator {
    pub fn new() -> Self {
        Self { guard: TickGuard::default() }
    }
}

impl Default for DefaultSnapshotTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotTranslator for DefaultSnapshotTranslator {
    fn build(&mut self, tick: u64, world: &World) -> Option<Snapshot> {
        build_snapshot(&mut self.guard, tick, world)
    }

    fn apply(&mut self, snapshot: &Snapshot, mirror: &mut World) -> bool {
        apply_snapshot(&mut self.guard, snapshot, mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityName;
    use crate::math::Point;

    fn world_with_hero(pos: Point) -> World {
        let mut world = World::default();
        let id = world.spawn_named(EntityName::from("hero"));
        world.insert(id, Position(pos));
        world
    }

    #[test]
    fn snapshots_strictly_increase_and_drop_stale() {
        let mut guard = TickGuard::default();
        let world = world_with_hero(Point::ZERO);

        let s1 = build_snapshot(&mut guard, 1, &world).expect("first snapshot emitted");
        assert_eq!(s1.server_tick, 1);

        assert!(build_snapshot(&mut guard, 1, &world).is_none());
        assert!(build_snapshot(&mut guard, 0, &world).is_none());

        let s2 = build_snapshot(&mut guard, 2, &world).expect("later snapshot emitted");
        assert_eq!(s2.server_tick, 2);
    }

    #[test]
    fn apply_is_monotonic_and_idempotent() {
        let mut guard = TickGuard::default();
        let mut mirror = world_with_hero(Point::ZERO);

        let snap_a = Snapshot {
            server_tick: 100,
            entities: vec![EntityState::at("hero", Point::new(5.0, 0.0))],
        };
        assert!(apply_snapshot(&mut guard, &snap_a, &mut mirror));
        assert_eq!(
            position_of(&mirror, &EntityName::from("hero")),
            Some(Point::new(5.0, 0.0))
        );

        // Reordered older tick must not move state backwards.
        let snap_stale = Snapshot {
            server_tick: 99,
            entities: vec![EntityState::at("hero", Point::new(-5.0, 0.0))],
        };
        assert!(!apply_snapshot(&mut guard, &snap_stale, &mut mirror));
        assert_eq!(
            position_of(&mirror, &EntityName::from("hero")),
            Some(Point::new(5.0, 0.0))
        );

        // Re-applying the same tick again is a no-op.
        assert!(!apply_snapshot(&mut guard, &snap_a, &mut mirror));
    }

    #[test]
    fn unknown_entity_in_snapshot_is_skipped_not_fatal() {
        let mut guard = TickGuard::default();
        let mut mirror = World::default();
        let snap = Snapshot {
            server_tick: 1,
            entities: vec![EntityState::at("ghost", Point::ZERO)],
        };
        assert!(apply_snapshot(&mut guard, &snap, &mut mirror));
    }

    #[test]
    fn wrap_allowance_accepts_reset_tick_near_max() {
        let mut guard = TickGuard::new(1000);
        assert!(guard.accept(u64::MAX - 1));
        // Without wrap allowance this would be rejected as non-increasing.
        assert!(guard.accept(1));
    }

    #[test]
    fn default_translator_matches_the_free_functions() {
        let mut translator = DefaultSnapshotTranslator::new();
        let world = world_with_hero(Point::new(1.0, 2.0));
        let snap = translator.build(1, &world).expect("first tick emits");
        assert_eq!(snap.server_tick, 1);
        assert!(translator.build(1, &world).is_none(), "non-monotonic tick rejected");

        let mut mirror = world_with_hero(Point::ZERO);
        assert!(translator.apply(&snap, &mut mirror));
        assert_eq!(position_of(&mirror, &EntityName::from("hero")), Some(Point::new(1.0, 2.0)));
    }
}
