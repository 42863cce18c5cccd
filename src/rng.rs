use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::reference::Reference;
use crate::types::ShuffleSeed;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
/// Small deterministic RNG so seeded shuffles are stable across platforms and `rand` releases.
pub(crate) struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        mix(self.state)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let value = self.next_u64_internal();
            let bytes = value.to_le_bytes();
            let remaining = dest.len() - offset;
            let copy_len = remaining.min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// Instance-local generator for the seeds used by unseeded `shuffle()` calls.
///
/// Every instance starts from the same fixed state, so the n-th unseeded shuffle
/// of a freshly built collection is reproducible, while successive shuffles of
/// one instance differ. Advancing only needs `&self`.
#[derive(Debug)]
pub struct ShuffleSeeds {
    state: AtomicU64,
}

impl ShuffleSeeds {
    /// Create a generator starting at `initial`.
    pub fn new(initial: u64) -> Self {
        Self {
            state: AtomicU64::new(initial),
        }
    }

    /// Draw the next shuffle seed.
    pub fn next_seed(&self) -> ShuffleSeed {
        let previous = self.state.fetch_add(GOLDEN_GAMMA, Ordering::Relaxed);
        mix(previous.wrapping_add(GOLDEN_GAMMA))
    }
}

/// Deterministically permute `references` using `seed`.
pub fn shuffle_references(references: &mut [Reference], seed: ShuffleSeed) {
    let mut rng = DeterministicRng::new(seed);
    references.shuffle(&mut rng);
}
