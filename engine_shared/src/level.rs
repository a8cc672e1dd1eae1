//! Level catalog.
//!
//! Level *loading* (parsing map files, asset pipelines) is out of scope for
//! this core; level *sequencing* — which level is current, where a freshly
//! spawned player starts, and when the campaign is exhausted — is not. This
//! module is the narrow collaborator interface spec §9 asks for in place of
//! a global mutable singleton.

use crate::math::Point;

/// Static definition of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelDef {
    pub name: String,
    pub start_tile: Point,
}

impl LevelDef {
    pub fn new(name: impl Into<String>, start_tile: Point) -> Self {
        Self { name: name.into(), start_tile }
    }
}

/// Result of asking the catalog to advance to the next level.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelTransition {
    /// A new level became current.
    Loaded(LevelDef),
    /// There was no next level; the campaign is over.
    Exhausted,
}

/// Narrow collaborator: current level, its start position, and whether the
/// campaign has more levels. No static/global access — always explicitly
/// passed to the tick loop.
pub trait LevelCatalog: Send {
    fn current(&self) -> &LevelDef;
    fn advance(&mut self) -> LevelTransition;
}

/// In-memory sequential catalog: a fixed ordered list of levels, advanced
/// linearly. This is the default implementation; nothing here reads from
/// disk.
pub struct SequentialLevelCatalog {
    levels: Vec<LevelDef>,
    index: usize,
}

impl SequentialLevelCatalog {
    pub fn new(levels: Vec<LevelDef>) -> Self {
        assert!(!levels.is_empty(), "a level catalog needs at least one level");
        Self { levels, index: 0 }
    }

    /// A single-level catalog, convenient for tests and simple deployments.
    pub fn single(name: impl Into<String>, start_tile: Point) -> Self {
        Self::new(vec![LevelDef::new(name, start_tile)])
    }
}

impl LevelCatalog for SequentialLevelCatalog {
    fn current(&self) -> &LevelDef {
        &self.levels[self.index]
    }

    fn advance(&mut self) -> LevelTransition {
        if self.index + 1 < self.levels.len() {
            self.index += 1;
            LevelTransition::Loaded(self.levels[self.index].clone())
        } else {
            LevelTransition::Exhausted
        }
    }
}
