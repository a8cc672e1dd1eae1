//! `engine_shared`
//!
//! Shared networking core used by both client and server binaries.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (wire codec, transport, ECS, dispatch,
//!   snapshot translation, lifecycle, config).
//! - Gameplay/level/engine collaborators are narrow traits, not globals.
//! - No `unsafe`.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod ecs;
pub mod level;
pub mod lifecycle;
pub mod math;
pub mod snapshot;
pub mod transport;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::controller::*;
    pub use crate::dispatch::*;
    pub use crate::ecs::*;
    pub use crate::level::*;
    pub use crate::lifecycle::*;
    pub use crate::math::*;
    pub use crate::snapshot::*;
    pub use crate::transport::*;
    pub use crate::wire::*;
}
