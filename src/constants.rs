/// Constants used by reference rendering.
pub mod reference {
    /// Separator between a parent reference and an expanding mutation's output index.
    pub const SEPARATOR: &str = "/";
}

/// Constants used by shuffling.
pub mod shuffle {
    /// Initial seed-generator state for base and delegating collections.
    pub const BASE_SEED: u64 = 12_310_331;
    /// Initial seed-generator state for filtering layers.
    pub const FILTER_SEED: u64 = 12_300_237;
    /// Initial seed-generator state for materialized fallback containers.
    pub const MATERIALIZED_SEED: u64 = 4_300_121;
}

/// Constants used by the iteration engine.
pub mod iteration {
    /// References resolved per resolver call when no batch size is configured.
    pub const DEFAULT_BATCH_SIZE: usize = 1;
}
