//! Core primitives.
//!
//! Geometry, deterministic randomness, binary buffers, time encoding and
//! hashing shared by the collision index, the scene and the replay codec.

pub mod aabb;
pub mod buffer;
pub mod hash;
pub mod rng;
pub mod time;
pub mod vec2;

// Re-export core types
pub use aabb::{Aabb, BoundingCircle};
pub use buffer::{BufferError, ByteReader, ByteWriter};
pub use hash::{StateHash, StateHasher};
pub use rng::DeterministicRng;
pub use time::{float_to_time, time_to_float};
pub use vec2::Vector2f;
