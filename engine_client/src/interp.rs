//! Interpolation.
//!
//! The server sends discrete snapshots at its broadcast rate; the client may
//! render at a different rate, so this buffers the last two snapshots and
//! exposes a lerp between them by entity name. This sits alongside, not
//! instead of, `engine_shared::snapshot::apply_snapshot`: the mirror world
//! always holds the latest authoritative position, while this buffer is only
//! consulted by rendering code that wants the in-between frame.

use std::collections::VecDeque;

use engine_shared::{
    ecs::EntityName,
    math::Point,
    wire::Snapshot,
};

/// Buffered snapshot history for interpolation. Holds at most two entries:
/// older and newer.
#[derive(Default)]
pub struct SnapshotBuffer {
    history: VecDeque<Snapshot>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self { history: VecDeque::new() }
    }

    pub fn push(&mut self, snap: Snapshot) {
        self.history.push_back(snap);
        while self.history.len() > 2 {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Interpolated position for `name` at fractional `alpha` in `[0, 1]`
    /// between the two most recent snapshots (0 = older, 1 = newer). Returns
    /// `None` until two snapshots have been buffered or the entity is absent
    /// from either one.
    pub fn interp_entity(&self, name: &EntityName, alpha: f32) -> Option<Point> {
        if self.history.len() < 2 {
            return None;
        }
        let older = &self.history[0];
        let newer = &self.history[1];

        let pa = older.entities.iter().find(|e| &e.name == name).map(|e| e.position);
        let pb = newer.entities.iter().find(|e| &e.name == name).map(|e| e.position);
        match (pa, pb) {
            (Some(pa), Some(pb)) => Some(pa.lerp(pb, alpha)),
            _ => None,
        }
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.history.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_shared::wire::EntityState;

    #[test]
    fn interpolates_between_last_two_snapshots() {
        let mut buf = SnapshotBuffer::new();
        buf.push(Snapshot { server_tick: 1, entities: vec![EntityState::at("hero", Point::new(0.0, 0.0))] });
        buf.push(Snapshot { server_tick: 2, entities: vec![EntityState::at("hero", Point::new(10.0, 0.0))] });

        let mid = buf.interp_entity(&EntityName::from("hero"), 0.5).unwrap();
        assert_eq!(mid, Point::new(5.0, 0.0));
    }

    #[test]
    fn keeps_only_the_two_most_recent_snapshots() {
        let mut buf = SnapshotBuffer::new();
        for tick in 1..=5u64 {
            buf.push(Snapshot { server_tick: tick, entities: vec![] });
        }
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.last_snapshot().unwrap().server_tick, 5);
    }

    #[test]
    fn missing_entity_in_either_snapshot_yields_none() {
        let mut buf = SnapshotBuffer::new();
        buf.push(Snapshot { server_tick: 1, entities: vec![] });
        buf.push(Snapshot { server_tick: 2, entities: vec![EntityState::at("hero", Point::ZERO)] });
        assert!(buf.interp_entity(&EntityName::from("hero"), 0.5).is_none());
    }
}
