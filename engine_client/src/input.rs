//! Input handling.
//!
//! In a real engine this would integrate with windowing, raw mouse/keyboard,
//! and action bindings. This scaffold focuses on turning sampled input into
//! the `Action` + `Point` pair the wire protocol carries, keyed off a simple
//! directional/target state a caller can fill in however it samples input.

use engine_shared::{math::Point, wire::Action};

/// Sampled input state for one client frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    /// Movement target in world space, or `None` if no movement is requested
    /// this frame.
    pub move_target: Option<Point>,
    pub cast_target: Option<Point>,
    pub interact_target: Option<Point>,
}

impl InputState {
    pub fn moving_toward(target: Point) -> Self {
        Self { move_target: Some(target), ..Default::default() }
    }

    /// Turns this frame's input into at most one `(Action, Point)` pair,
    /// preferring movement over skill casts over interaction when more than
    /// one is set in the same frame.
    pub fn to_action(self) -> Option<(Action, Point)> {
        if let Some(target) = self.move_target {
            return Some((Action::Move, target));
        }
        if let Some(target) = self.cast_target {
            return Some((Action::CastSkill, target));
        }
        if let Some(target) = self.interact_target {
            return Some((Action::Interact, target));
        }
        None
    }
}
