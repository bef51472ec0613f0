//! Bounding Volumes
//!
//! Axis-aligned boxes used by the grid index and the narrow-phase checks.

use serde::{Serialize, Deserialize};

use super::vec2::Vector2f;

/// Sentinel used for an empty box.
pub const BIG_VALUE: f32 = 1e10;

/// Axis-aligned bounding box.
///
/// A freshly created box is empty (`min > max`) and grows with every
/// point or circle added to it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Lower-left corner
    pub min: Vector2f,
    /// Upper-right corner
    pub max: Vector2f,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// An empty box.
    pub const fn empty() -> Self {
        Self {
            min: Vector2f::new(BIG_VALUE, BIG_VALUE),
            max: Vector2f::new(-BIG_VALUE, -BIG_VALUE),
        }
    }

    /// Box spanning two corners (order does not matter).
    pub fn from_corners(a: Vector2f, b: Vector2f) -> Self {
        let mut bbox = Self::empty();
        bbox.add_point(a);
        bbox.add_point(b);
        bbox
    }

    /// Box enclosing a circle.
    pub fn around_circle(center: Vector2f, radius: f32) -> Self {
        let mut bbox = Self::empty();
        bbox.add_circle(center, radius);
        bbox
    }

    /// Reset to the empty box.
    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// True if nothing was ever added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Grow to include a point.
    pub fn add_point(&mut self, p: Vector2f) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Grow to include a circle.
    pub fn add_circle(&mut self, center: Vector2f, radius: f32) {
        self.add_point(Vector2f::new(center.x + radius, center.y + radius));
        self.add_point(Vector2f::new(center.x - radius, center.y - radius));
    }

    /// Shift the box.
    pub fn translate(&mut self, offset: Vector2f) {
        self.min += offset;
        self.max += offset;
    }

    /// Width and height.
    pub fn size(&self) -> Vector2f {
        self.max - self.min
    }

    /// Point containment, borders included.
    pub fn contains_point(&self, p: Vector2f) -> bool {
        p.x >= self.min.x && p.y >= self.min.y && p.x <= self.max.x && p.y <= self.max.y
    }

    /// Box-box touch test with a 0.0001 tolerance.
    ///
    /// Two boxes touch when the box enclosing both is not larger than the
    /// sum of their extents on either axis.
    pub fn intersects(&self, other: &Aabb) -> bool {
        let full_min = Vector2f::new(other.min.x.min(self.min.x), other.min.y.min(self.min.y));
        let full_max = Vector2f::new(other.max.x.max(self.max.x), other.max.y.max(self.max.y));
        full_max.x - full_min.x < 0.0001 + (other.max.x - other.min.x) + (self.max.x - self.min.x)
            && full_max.y - full_min.y
                < 0.0001 + (other.max.y - other.min.y) + (self.max.y - self.min.y)
    }

    /// Circle touch, approximated by the circle's box.
    pub fn touches_circle(&self, center: Vector2f, radius: f32) -> bool {
        self.intersects(&Self::around_circle(center, radius))
    }
}

/// Circle with its cached bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingCircle {
    /// Center
    pub center: Vector2f,
    /// Radius
    pub radius: f32,
}

impl BoundingCircle {
    /// Create a circle.
    pub fn new(center: Vector2f, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Enclosing box.
    pub fn aabb(&self) -> Aabb {
        Aabb::around_circle(self.center, self.radius)
    }

    /// Circle-circle overlap.
    pub fn touches_circle(&self, center: Vector2f, radius: f32) -> bool {
        let r = self.radius + radius;
        self.center.sub(center).length_squared() <= r * r
    }

    /// Square containment test around the center.
    pub fn touches_point(&self, p: Vector2f) -> bool {
        (p.x - self.center.x).abs() < self.radius && (p.y - self.center.y).abs() < self.radius
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_grows() {
        let mut bbox = Aabb::empty();
        assert!(bbox.is_empty());
        bbox.add_point(Vector2f::new(1.0, 2.0));
        bbox.add_point(Vector2f::new(-1.0, 5.0));
        assert!(!bbox.is_empty());
        assert_eq!(bbox.min, Vector2f::new(-1.0, 2.0));
        assert_eq!(bbox.max, Vector2f::new(1.0, 5.0));
    }

    #[test]
    fn test_intersects_touching_edges() {
        let a = Aabb::from_corners(Vector2f::new(0.0, 0.0), Vector2f::new(1.0, 1.0));
        let b = Aabb::from_corners(Vector2f::new(1.0, 0.0), Vector2f::new(2.0, 1.0));
        let c = Aabb::from_corners(Vector2f::new(1.5, 0.0), Vector2f::new(2.0, 1.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_circle_box() {
        let bbox = Aabb::around_circle(Vector2f::new(2.0, 3.0), 0.5);
        assert_eq!(bbox.min, Vector2f::new(1.5, 2.5));
        assert_eq!(bbox.max, Vector2f::new(2.5, 3.5));
        assert!(bbox.contains_point(Vector2f::new(2.0, 3.0)));
    }

    #[test]
    fn test_bounding_circle_overlap() {
        let c = BoundingCircle::new(Vector2f::ZERO, 1.0);
        assert!(c.touches_circle(Vector2f::new(1.5, 0.0), 0.5));
        assert!(!c.touches_circle(Vector2f::new(3.0, 0.0), 0.5));
        assert!(c.touches_point(Vector2f::new(0.5, -0.5)));
    }
}
