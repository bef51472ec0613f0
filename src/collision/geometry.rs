//! Narrow-Phase Geometry
//!
//! Static terrain segments and the exact circle/segment tests run against
//! them once the grid has narrowed the candidates down.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vector2f;

/// Distance tolerance of the intersection parameters.
const HIT_TOLERANCE: f64 = 0.0001;

/// Blocking segment with a grip coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Start X
    pub x1: f32,
    /// Start Y
    pub y1: f32,
    /// End X
    pub x2: f32,
    /// End Y
    pub y2: f32,
    /// Wheel grip on this segment
    pub grip: f32,
}

impl Line {
    /// Create a segment.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, grip: f32) -> Self {
        Self { x1, y1, x2, y2, grip }
    }

    /// Start point.
    pub fn start(&self) -> Vector2f {
        Vector2f::new(self.x1, self.y1)
    }

    /// End point.
    pub fn end(&self) -> Vector2f {
        Vector2f::new(self.x2, self.y2)
    }
}

/// Intersection points of a segment and a circle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LineCircleHits {
    /// No contact
    None,
    /// One crossing
    One(Vector2f),
    /// Two crossings, in segment order
    Two(Vector2f, Vector2f),
}

impl LineCircleHits {
    /// Number of crossings.
    pub fn count(&self) -> usize {
        match self {
            LineCircleHits::None => 0,
            LineCircleHits::One(_) => 1,
            LineCircleHits::Two(_, _) => 2,
        }
    }
}

/// Intersect segment `a0..a1` with the circle (`center`, `radius`).
///
/// The quadratic is solved in `f64`; single precision misses grazing
/// contacts on long segments.
pub fn intersect_line_circle(center: Vector2f, radius: f32, a0: Vector2f, a1: Vector2f) -> LineCircleHits {
    // Box rejection first
    let circle_min = Vector2f::new(center.x - radius, center.y - radius);
    let circle_max = Vector2f::new(center.x + radius, center.y + radius);
    if a0.x.max(a1.x) < circle_min.x || a0.x.min(a1.x) > circle_max.x {
        return LineCircleHits::None;
    }
    if a0.y.max(a1.y) < circle_min.y || a0.y.min(a1.y) > circle_max.y {
        return LineCircleHits::None;
    }

    if a1.almost_equal(a0) {
        return LineCircleHits::None;
    }
    let mut rd = a1 - a0;
    let rl = rd.normalize() as f64;
    let v = a0 - center;
    let b = -(v.dot(rd) as f64);
    let mut det = b * b - v.dot(v) as f64 + (radius * radius) as f64;
    if det < 0.0 && det > -HIT_TOLERANCE {
        det = 0.0;
    }
    if det < 0.0 {
        return LineCircleHits::None;
    }

    let det = det.sqrt();
    let i1 = b - det;
    let i2 = b + det;
    let on_segment = |i: f64| i > -HIT_TOLERANCE && i < rl + HIT_TOLERANCE;
    let at = |i: f64| a0 + rd * (i as f32);

    match (on_segment(i1), on_segment(i2)) {
        (true, true) => LineCircleHits::Two(at(i1), at(i2)),
        (true, false) => LineCircleHits::One(at(i1)),
        (false, true) => LineCircleHits::One(at(i2)),
        (false, false) => LineCircleHits::None,
    }
}

/// Boolean circle/segment touch.
///
/// Segments are one-sided: a circle whose center lies behind the segment
/// (right of its direction) never touches it.
pub fn check_circle_and_line(line: &Line, x: f32, y: f32, r: f32) -> bool {
    let vx = line.x2 - line.x1;
    let vy = line.y2 - line.y1;
    let enx = -vy;
    let eny = vx;
    if enx * x + eny * y < enx * line.x1 + eny * line.y1 {
        return false;
    }

    if vx.abs() < 0.0001 && vy.abs() < 0.0001 {
        return false;
    }

    let (dx1, dy1) = (line.x1 - x, line.y1 - y);
    if dx1 * dx1 + dy1 * dy1 <= r * r {
        return true;
    }
    let (dx2, dy2) = (line.x2 - x, line.y2 - y);
    if dx2 * dx2 + dy2 * dy2 <= r * r {
        return true;
    }

    intersect_line_circle(Vector2f::new(x, y), r, line.start(), line.end()).count() > 0
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_crossing_two_points() {
        let hits = intersect_line_circle(
            Vector2f::new(0.0, 0.0),
            1.0,
            Vector2f::new(-2.0, 0.0),
            Vector2f::new(2.0, 0.0),
        );
        match hits {
            LineCircleHits::Two(p1, p2) => {
                assert!(p1.almost_equal(Vector2f::new(-1.0, 0.0)));
                assert!(p2.almost_equal(Vector2f::new(1.0, 0.0)));
            }
            other => panic!("expected two hits, got {:?}", other),
        }
    }

    #[test]
    fn test_segment_ending_inside_circle() {
        let hits = intersect_line_circle(
            Vector2f::ZERO,
            1.0,
            Vector2f::new(-2.0, 0.0),
            Vector2f::new(0.0, 0.0),
        );
        assert_eq!(hits.count(), 1);
    }

    #[test]
    fn test_box_rejection_and_degenerate() {
        let far = intersect_line_circle(Vector2f::ZERO, 1.0, Vector2f::new(5.0, 5.0), Vector2f::new(6.0, 5.0));
        assert_eq!(far, LineCircleHits::None);
        let dot = intersect_line_circle(Vector2f::ZERO, 1.0, Vector2f::new(0.5, 0.0), Vector2f::new(0.5, 0.0));
        assert_eq!(dot, LineCircleHits::None);
    }

    #[test]
    fn test_check_is_one_sided() {
        // Left to right: the normal (-vy, vx) points up
        let ground = Line::new(-5.0, 0.0, 5.0, 0.0, 20.0);
        assert!(check_circle_and_line(&ground, 0.0, 0.3, 0.5));
        assert!(!check_circle_and_line(&ground, 0.0, -0.3, 0.5));
    }

    #[test]
    fn test_check_endpoint_inside() {
        let line = Line::new(0.0, 0.0, 10.0, 0.0, 20.0);
        assert!(check_circle_and_line(&line, 0.2, 0.2, 0.5));
        assert!(!check_circle_and_line(&line, 0.0, 2.0, 0.5));
    }
}
