use serde::{Deserialize, Serialize};

use crate::constants::iteration::DEFAULT_BATCH_SIZE;

/// Controls how the iteration engine resolves references.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterationConfig {
    /// References resolved per resolver call; values above 1 enable batched resolution.
    pub batch_size: usize,
    /// Advance silently past references that resolve to no item instead of failing.
    ///
    /// Needed by mutating layers, where a mutator may legitimately produce nothing.
    pub skip_missing: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            skip_missing: false,
        }
    }
}

impl IterationConfig {
    /// Batched resolution with `batch_size` references per resolver call.
    pub fn batched(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..Self::default()
        }
    }

    /// Same configuration with missing resolutions skipped.
    pub fn skipping_missing(mut self) -> Self {
        self.skip_missing = true;
        self
    }
}

/// How a filtering layer reports its references.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    /// References are forwarded from the wrapped collection unfiltered.
    ///
    /// Iteration yields only included items, so references and items may disagree.
    #[default]
    Passthrough,
    /// References are reconciled to exactly the included items, so shuffles and
    /// rebinds reproduce the filtered set.
    Repeatable,
}

/// Ownership of a caching layer's cache across rebound views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheMode {
    /// Rebound and shuffled views share one synchronized cache.
    #[default]
    Shared,
    /// Each view owns its cache; entries are released when the view is dropped.
    Exclusive,
}

/// Which items a stride keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrideKeep {
    /// Keep only the item at the stride index.
    Only,
    /// Keep every item except the one at the stride index.
    AllBut,
}
