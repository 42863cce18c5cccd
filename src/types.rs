/// Flat, caller-visible reference key.
/// Examples: `recordings/2024-02-01/pump-a.wav`, `7`, `rec-1/0`
pub type ReferenceKey = String;
/// Seed used for deterministic shuffles.
/// Example: `12310331`
pub type ShuffleSeed = u64;
/// Position of an item within a stride (0-based).
/// Example: `2` selects the third item of every stride.
pub type StridePosition = usize;
