//! Entity controller.
//!
//! Gameplay rules (the hero factory, skill definitions, pathfinding,
//! interactables) are out of scope. This module is the narrow interface the
//! tick loop calls into instead of reaching directly for gameplay code, per
//! spec §9's design note. The default `SimController` implements just enough
//! kinematics to make the MOVE action observable end-to-end; the other three
//! actions are logged stubs, since casting skills, path-following, and
//! interaction resolution are gameplay rules this core does not own.

use tracing::debug;

use crate::ecs::{EntityId, Position, World};
use crate::math::Point;

/// Narrow collaborator the tick loop drives input through instead of calling
/// gameplay systems directly.
pub trait EntityController: Send {
    fn apply_move(&mut self, world: &mut World, entity: EntityId, target: Point);
    fn follow_path(&mut self, world: &mut World, entity: EntityId, target: Point);
    fn cast_skill(&mut self, world: &mut World, entity: EntityId, target: Point);
    fn interact(&mut self, world: &mut World, entity: EntityId, target: Point);
}

/// Kinematic default: MOVE nudges the entity along the direction derived
/// from the input point, scaled by a fixed per-tick speed.
pub struct SimController {
    pub move_speed: f32,
}

impl Default for SimController {
    fn default() -> Self {
        Self { move_speed: 0.1 }
    }
}

impl EntityController for SimController {
    fn apply_move(&mut self, world: &mut World, entity: EntityId, target: Point) {
        let Some(pos) = world.get_mut::<Position>(entity) else {
            return;
        };
        let dir = target.normalized();
        pos.0 = pos.0 + dir * self.move_speed;
    }

    fn follow_path(&mut self, _world: &mut World, entity: EntityId, target: Point) {
        debug!(?entity, ?target, "path-following requested (not implemented by this core)");
    }

    fn cast_skill(&mut self, _world: &mut World, entity: EntityId, target: Point) {
        debug!(?entity, ?target, "skill cast requested (not implemented by this core)");
    }

    fn interact(&mut self, _world: &mut World, entity: EntityId, target: Point) {
        debug!(?entity, ?target, "interaction requested (not implemented by this core)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityName;

    #[test]
    fn move_advances_position_toward_target() {
        let mut world = World::default();
        let id = world.spawn_named(EntityName::from("hero"));
        world.insert(id, Position(Point::ZERO));

        let mut controller = SimController::default();
        for _ in 0..10 {
            controller.apply_move(&mut world, id, Point::new(1.0, 0.0));
        }

        let pos = world.get::<Position>(id).unwrap().0;
        assert!(pos.x > 0.0, "expected monotonic +x movement, got {pos:?}");
        assert_eq!(pos.y, 0.0);
    }
}
