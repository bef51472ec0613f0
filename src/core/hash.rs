//! Content Hashing
//!
//! Domain-separated SHA-256 digests:
//! - replay content (header, events, chunks, block tracks)
//! - scene state fingerprints in determinism tests

use sha2::{Sha256, Digest};

use super::vec2::Vector2f;

/// 256-bit digest.
pub type StateHash = [u8; 32];

/// Domain separator for replay digests.
pub const REPLAY_DOMAIN: &[u8] = b"XMOTO_REPLAY_V1";

/// Domain separator for scene fingerprints.
pub const SCENE_DOMAIN: &[u8] = b"XMOTO_SCENE_V1";

/// SHA-256 with typed, little-endian feeders. Feed order matters.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Start a digest in `domain`.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Digest of replay content.
    pub fn for_replay() -> Self {
        Self::new(REPLAY_DOMAIN)
    }

    /// Digest of scene state.
    pub fn for_scene() -> Self {
        Self::new(SCENE_DOMAIN)
    }

    /// Raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// `u32`.
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// `i32`.
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// `f32` bit pattern, so `-0.0` and `0.0` differ.
    #[inline]
    pub fn update_f32(&mut self, value: f32) {
        self.hasher.update(value.to_bits().to_le_bytes());
    }

    /// Both components.
    #[inline]
    pub fn update_vec2(&mut self, value: Vector2f) {
        self.update_f32(value.x);
        self.update_f32(value.y);
    }

    /// One byte.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.hasher.update([value as u8]);
    }

    /// Length-prefixed string.
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Finish.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

// =============================================================================
// TESTS
// =============================================================================
