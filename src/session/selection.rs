//! Active window selection and its generation counter

use crate::market_data::{Generation, WindowKey};

/// The single active key plus the epoch that invalidates older callbacks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSelection {
    key: Option<WindowKey>,
    generation: Generation,
}

impl ActiveSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<WindowKey> {
        self.key
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Make `key` active. Returns the new generation, or `None` when `key` is
    /// already active.
    pub fn switch_to(&mut self, key: WindowKey) -> Option<Generation> {
        if self.key == Some(key) {
            return None;
        }
        self.key = Some(key);
        Some(self.bump())
    }

    /// Start a new generation for the current key
    pub fn bump(&mut self) -> Generation {
        self.generation += 1;
        self.generation
    }

    /// Whether a callback for `key` stamped with `generation` is still current
    pub fn matches(&self, key: WindowKey, generation: Generation) -> bool {
        self.key == Some(key) && self.generation == generation
    }

    pub fn is_active(&self, key: &WindowKey) -> bool {
        self.key.as_ref() == Some(key)
    }
}
