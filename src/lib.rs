//! # X-Moto Simulation Core
//!
//! Level-side simulation for X-Moto: broad-phase collision, entities and
//! particles, scripted scene events, and the `.rpl` replay codec.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      XMOTO SIM                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - f32 2D vector                             │
//! │  ├── aabb.rs     - Bounding boxes and circles                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  ├── buffer.rs   - Little-endian byte streams                │
//! │  ├── time.rs     - Centisecond time encoding                 │
//! │  └── hash.rs     - SHA-256 digests                           │
//! │                                                              │
//! │  collision/      - Broad phase                               │
//! │  ├── grid.rs     - Uniform grid element index                │
//! │  ├── geometry.rs - Line/circle tests                         │
//! │  └── system.rs   - Static lines and element handlers         │
//! │                                                              │
//! │  scene/          - Level simulation                          │
//! │  ├── level.rs    - Level model and loaders                   │
//! │  ├── block.rs    - Blocks                                    │
//! │  ├── entity.rs   - Entities                                  │
//! │  ├── particles.rs- Particle sources and pools                │
//! │  ├── motion.rs   - Script-driven motions                     │
//! │  └── mod.rs      - Scene, players, cameras, update loop      │
//! │                                                              │
//! │  events.rs       - Scene event log (replay wire format)      │
//! │  replay/         - .rpl recording and playback               │
//! │  config.rs       - Simulation settings                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Given the same level, settings and event stream, a scene evolves the
//! same way on every run:
//! - No HashMap (BTreeMap or Vec for anything iterated)
//! - All randomness from the seeded generator in [`SimContext`]
//! - Process-wide counters live in [`SimContext`], not in statics

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod collision;
pub mod config;
pub mod core;
pub mod events;
pub mod replay;
pub mod scene;

// Re-export commonly used types
pub use crate::core::aabb::Aabb;
pub use crate::core::rng::DeterministicRng;
pub use crate::core::vec2::Vector2f;
pub use collision::{CollisionSystem, ElementHandler};
pub use config::SimConfig;
pub use events::{GameEventType, SceneEvent, SceneEventData};
pub use replay::{Replay, ReplayError, ReplayInfo};
pub use scene::context::MAX_PARTICLES;
pub use scene::{Level, Scene, SimContext};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
