//! Heap engine configuration

use serde::{Deserialize, Serialize};

/// Growth policy and size limit of [`HeapEngine`](crate::HeapEngine) blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapEngineConfig {
    /// Capacity of the first buffer allocated for an empty container
    pub initial_capacity: usize,
    /// Factor applied to the capacity when a container outgrows its buffer
    pub growth_factor: f64,
    /// Largest single block the engine allocates, in bytes
    pub max_block_size: usize,
}

impl Default for HeapEngineConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 4,
            growth_factor: 2.0,
            max_block_size: 1 << 30,
        }
    }
}

impl HeapEngineConfig {
    /// Capacity after growing from `capacity` to hold at least `needed`
    /// elements
    pub fn grown_capacity(&self, capacity: usize, needed: usize) -> usize {
        let factor = if self.growth_factor > 1.0 {
            self.growth_factor
        } else {
            2.0
        };
        let grown = (capacity as f64 * factor).ceil() as usize;
        needed.max(grown).max(self.initial_capacity.max(1))
    }
}
