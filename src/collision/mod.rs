//! Collision detection.
//!
//! Uniform-grid broad phase for entities and blocks, plus the static line
//! grid and exact circle/segment tests used for the wheels.

pub mod geometry;
pub mod grid;
pub mod system;

pub use geometry::{check_circle_and_line, intersect_line_circle, Line, LineCircleHits};
pub use grid::{Collidable, CollisionError, ElementHandler, CD_EPSILON};
pub use system::{CollisionStats, CollisionSystem, LineSource, ObjectId};
