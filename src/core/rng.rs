//! Particle Randomness
//!
//! Xorshift128+ seeded through SplitMix64. Particle spawn velocities,
//! colours and emission rolls all come from one generator carried by the
//! simulation context, so a scene seeded the same way sheds the same smoke
//! and sparks on every run.

use serde::{Serialize, Deserialize};

/// Seeded Xorshift128+ generator.
///
/// ```
/// use xmoto_sim::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// assert_eq!(rng.next_u64(), 6233086606872742541);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seed the generator.
    pub fn new(seed: u64) -> Self {
        let mut mix = seed;
        let state = [splitmix64(&mut mix), splitmix64(&mut mix)];
        // An all-zero state would only ever yield zero
        if state == [0, 0] {
            return Self { state: [1, 1] };
        }
        Self { state }
    }

    /// Raw 64-bit output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [a, b] = self.state;
        let out = a.wrapping_add(b);
        let mixed = a ^ b;
        self.state = [a.rotate_left(24) ^ mixed ^ (mixed << 16), mixed.rotate_left(37)];
        out
    }

    /// Float in `[0, 1)` with 24 significant bits.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// `min + (max - min) * u`. Swapped bounds are fine.
    #[inline]
    pub fn random_num(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    /// Internal state, to snapshot a scene.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore a snapshot from [`DeterministicRng::state`].
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================
