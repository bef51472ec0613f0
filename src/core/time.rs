//! Simulation Time
//!
//! Time is an integer count of centiseconds. Files store it as seconds in
//! an `f32`; the write side adds 0.001 so that reading back truncates to
//! the same integer.

/// Centiseconds to stored seconds.
#[inline]
pub fn time_to_float(time: i32) -> f32 {
    (time as f64 / 100.0 + 0.001) as f32
}

/// Stored seconds to centiseconds (truncating).
#[inline]
pub fn float_to_time(seconds: f32) -> i32 {
    (seconds as f64 * 100.0) as i32
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_exact() {
        for t in [0, 1, 99, 100, 101, 4567, 123_456, 8_640_000] {
            assert_eq!(float_to_time(time_to_float(t)), t, "time {}", t);
        }
    }

    #[test]
    fn test_truncation() {
        assert_eq!(float_to_time(1.239), 123);
        assert_eq!(float_to_time(0.0), 0);
    }
}
