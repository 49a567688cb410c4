// Angle type and shortest-path wrap-around math
//
// Angles are kept in degrees so that exact boundary inputs (90°, 180°) stay
// exact through normalization.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg, Sub};

/// Full revolution in degrees
const REVOLUTION_DEG: f64 = 360.0;
const HALF_REVOLUTION_DEG: f64 = 180.0;

/// A heading or module angle, unbounded (may exceed one revolution)
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Angle {
    degrees: f64,
}

impl Angle {
    pub const ZERO: Angle = Angle { degrees: 0.0 };

    pub const fn from_degrees(degrees: f64) -> Self {
        Self { degrees }
    }

    pub fn from_radians(radians: f64) -> Self {
        Self {
            degrees: radians.to_degrees(),
        }
    }

    pub const fn as_degrees(self) -> f64 {
        self.degrees
    }

    pub fn as_radians(self) -> f64 {
        self.degrees.to_radians()
    }

    pub fn sin(self) -> f64 {
        self.as_radians().sin()
    }

    pub fn cos(self) -> f64 {
        self.as_radians().cos()
    }

    /// Same direction, reduced into (-180°, 180°]
    pub fn wrapped(self) -> Self {
        Self::from_degrees(wrap_degrees(self.degrees))
    }

    /// Shortest signed rotation from `self` to `target`, in (-180°, 180°]
    pub fn shortest_delta(self, target: Angle) -> Angle {
        Self::from_degrees(shortest_delta_degrees(self.degrees, target.degrees))
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle::from_degrees(self.degrees + rhs.degrees)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle::from_degrees(self.degrees - rhs.degrees)
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Angle {
        Angle::from_degrees(-self.degrees)
    }
}

/// Reduce any angle in degrees into (-180, 180]
pub fn wrap_degrees(degrees: f64) -> f64 {
    let reduced = degrees.rem_euclid(REVOLUTION_DEG);
    if reduced > HALF_REVOLUTION_DEG {
        reduced - REVOLUTION_DEG
    } else {
        reduced
    }
}

/// Shortest signed rotation (degrees) that takes `current` onto `target`
///
/// Inputs may lie outside [0, 360); the result is always in (-180, 180], so a
/// half-turn resolves to +180.
pub fn shortest_delta_degrees(current: f64, target: f64) -> f64 {
    wrap_degrees(target - current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_wrap_degrees_range() {
        assert_close(wrap_degrees(0.0), 0.0);
        assert_close(wrap_degrees(190.0), -170.0);
        assert_close(wrap_degrees(-190.0), 170.0);
        assert_close(wrap_degrees(720.0 + 45.0), 45.0);
        assert_close(wrap_degrees(-720.0 - 45.0), -45.0);
    }

    #[test]
    fn test_half_turn_is_positive() {
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(540.0), 180.0);
        assert_eq!(shortest_delta_degrees(0.0, 180.0), 180.0);
        assert_eq!(shortest_delta_degrees(90.0, -90.0), 180.0);
    }

    #[test]
    fn test_shortest_delta_crosses_seam() {
        // 350° -> 10° is a 20° counter-clockwise move, not -340°
        assert_close(shortest_delta_degrees(350.0, 10.0), 20.0);
        assert_close(shortest_delta_degrees(10.0, 350.0), -20.0);
        // Unbounded inputs reduce before comparing
        // (-710 ≡ 10, 725 ≡ 5)
        assert_close(shortest_delta_degrees(-710.0, 725.0), -5.0);
    }

    #[test]
    fn test_shortest_delta_never_exceeds_half_turn() {
        let mut current = -1000.0;
        while current < 1000.0 {
            let mut target = -1000.0;
            while target < 1000.0 {
                let delta = shortest_delta_degrees(current, target);
                assert!(delta > -180.0 && delta <= 180.0, "delta {delta} out of range");
                target += 37.0;
            }
            current += 41.0;
        }
    }

    #[test]
    fn test_angle_conversions() {
        let angle = Angle::from_radians(std::f64::consts::FRAC_PI_2);
        assert_close(angle.as_degrees(), 90.0);
        assert_close(Angle::from_degrees(180.0).as_radians(), std::f64::consts::PI);
        assert_close(Angle::from_degrees(30.0).sin(), 0.5);
        assert_close(Angle::from_degrees(370.0).wrapped().as_degrees(), 10.0);
        assert_close(
            Angle::from_degrees(10.0)
                .shortest_delta(Angle::from_degrees(-30.0))
                .as_degrees(),
            -40.0,
        );
    }
}
