//! Inverse-kinematics solver for the two-segment arm.
//!
//! # Model
//!
//! Three joints position the end effector: base yaw rotates the whole arm
//! around the vertical axis, shoulder pitches the first segment, elbow bends
//! the second segment relative to the first. With segment lengths `l1`, `l2`:
//!
//! ```text
//! x = l1·cos(shoulder)·cos(yaw) + l2·cos(shoulder + elbow − π)·cos(yaw)
//! y = l1·cos(shoulder)·sin(yaw) + l2·cos(shoulder + elbow − π)·sin(yaw)
//! z = l1·sin(shoulder)          + l2·sin(shoulder + elbow − π)
//! ```
//!
//! # Search strategy
//!
//! Base yaw is computed directly from the target's bearing (no search); the
//! shoulder/elbow pair is found by nested ternary search. The shoulder domain
//! is split at the target's elevation angle and the sub-intervals above and
//! below the split are searched independently, each with an inner ternary
//! search over the elbow domain per trial shoulder. Infeasible targets are an
//! expected outcome, not an error: the caller gets `None` whenever the best
//! reachable point is further from the target than its tolerance.

use crate::error::{Error, Result};
use std::f64::consts::{FRAC_PI_2, PI};

/// Shoulder travel limits in radians (-7.5 to 130 degrees)
pub const SHOULDER_MIN: f64 = -0.1309;
pub const SHOULDER_MAX: f64 = 2.2689;

/// Elbow travel limits in radians
pub const ELBOW_MIN: f64 = 0.7854;
pub const ELBOW_MAX: f64 = 5.218;

/// Accepted range for the search iteration count
const MIN_ITERATIONS: u32 = 5;
const MAX_ITERATIONS: u32 = 100;

/// Preference margin for the above-split shoulder branch: the below-split
/// branch must beat the upper branch by this much before it is selected.
/// Keeps the arm in the elbow-up pose family instead of flipping between
/// families when both branches land near the same error.
// TODO: shrink this margin once elbow-down poses are validated on the arm.
const UPPER_BRANCH_MARGIN: f64 = 999_999.0;

/// One arm pose: base yaw, shoulder and elbow angles in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles {
    pub base_yaw: f64,
    pub shoulder: f64,
    pub elbow: f64,
}

/// Inverse-kinematics solver for a fixed arm geometry
#[derive(Debug, Clone)]
pub struct ArmSolver {
    /// First segment length in meters
    l1: f64,
    /// Second segment length in meters
    l2: f64,
    /// Ternary search rounds per bracket
    iterations: u32,
}

/// Best (distance, shoulder, elbow) found within one shoulder bracket
type BranchResult = (f64, f64, f64);

impl ArmSolver {
    /// Create a solver for an arm with the given segment lengths.
    ///
    /// `iterations` is the number of bracket-narrowing rounds for every
    /// ternary search; values outside `[5, 100]` are rejected.
    pub fn new(l1: f64, l2: f64, iterations: u32) -> Result<Self> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
            return Err(Error::InvalidIterations(iterations));
        }
        Ok(Self { l1, l2, iterations })
    }

    /// Forward kinematics: end-effector position for a pose
    pub fn end_effector(&self, angles: &JointAngles) -> [f64; 3] {
        let reach = self.l1 * angles.shoulder.cos()
            + self.l2 * (angles.shoulder + angles.elbow - PI).cos();
        [
            reach * angles.base_yaw.cos(),
            reach * angles.base_yaw.sin(),
            self.l1 * angles.shoulder.sin() + self.l2 * (angles.shoulder + angles.elbow - PI).sin(),
        ]
    }

    /// Euclidean distance from the pose's end effector to `target`
    pub fn distance_to(&self, target: [f64; 3], angles: &JointAngles) -> f64 {
        let p = self.end_effector(angles);
        let dx = target[0] - p[0];
        let dy = target[1] - p[1];
        let dz = target[2] - p[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Compute joint angles reaching `target` (meters) to within
    /// `max_distance` (meters), or `None` if the target is out of reach.
    pub fn solve(&self, target: [f64; 3], max_distance: f64) -> Option<JointAngles> {
        let base_yaw = base_yaw(target[0], target[1]);
        let (distance, shoulder, elbow) = self.best_shoulder_elbow(target, base_yaw);

        let angles = JointAngles {
            base_yaw,
            shoulder,
            elbow,
        };
        // `<=` so a NaN distance (degenerate target) reports infeasible
        if distance <= max_distance {
            log::debug!(
                "Solved target ({:.3}, {:.3}, {:.3}) with error {:.5} m",
                target[0],
                target[1],
                target[2],
                distance
            );
            Some(angles)
        } else {
            log::debug!(
                "Target ({:.3}, {:.3}, {:.3}) out of reach, best error {:.5} m",
                target[0],
                target[1],
                target[2],
                distance
            );
            None
        }
    }

    /// Search both shoulder branches around the elevation split and keep the
    /// better result, with the upper branch winning ties by a wide margin.
    fn best_shoulder_elbow(&self, target: [f64; 3], base_yaw: f64) -> BranchResult {
        let norm =
            (target[0] * target[0] + target[1] * target[1] + target[2] * target[2]).sqrt();
        // Elevation angle of the target, the natural divide between poses that
        // approach from above and from below
        let split = if norm > 0.0 {
            (target[2] / norm).asin().clamp(SHOULDER_MIN, SHOULDER_MAX)
        } else {
            0.0
        };

        let upper = self.search_shoulder(target, base_yaw, split, SHOULDER_MAX);
        let lower = self.search_shoulder(target, base_yaw, SHOULDER_MIN, split);

        if upper.0 - UPPER_BRANCH_MARGIN <= lower.0 {
            upper
        } else {
            lower
        }
    }

    /// Ternary search over one shoulder bracket; every trial shoulder runs a
    /// full elbow search.
    fn search_shoulder(
        &self,
        target: [f64; 3],
        base_yaw: f64,
        mut lo: f64,
        mut hi: f64,
    ) -> BranchResult {
        let mut low_probe: BranchResult = (f64::INFINITY, lo, ELBOW_MIN);
        let mut high_probe: BranchResult = (f64::INFINITY, hi, ELBOW_MIN);

        for _ in 0..self.iterations {
            let mid1 = lo + (hi - lo) / 3.0;
            let mid2 = lo + 2.0 * (hi - lo) / 3.0;

            let (d1, elbow1) = self.search_elbow(target, base_yaw, mid1);
            let (d2, elbow2) = self.search_elbow(target, base_yaw, mid2);

            low_probe = (d1, mid1, elbow1);
            high_probe = (d2, mid2, elbow2);

            // Discard the worse third of the bracket
            if d1 > d2 {
                lo = mid1;
            } else {
                hi = mid2;
            }
        }

        if low_probe.0 < high_probe.0 {
            low_probe
        } else {
            high_probe
        }
    }

    /// Ternary search over the full elbow domain for a fixed shoulder
    fn search_elbow(&self, target: [f64; 3], base_yaw: f64, shoulder: f64) -> (f64, f64) {
        let mut lo = ELBOW_MIN;
        let mut hi = ELBOW_MAX;
        let mut best = (f64::INFINITY, lo);

        for _ in 0..self.iterations {
            let mid1 = lo + (hi - lo) / 3.0;
            let mid2 = lo + 2.0 * (hi - lo) / 3.0;

            let d1 = self.distance_to(
                target,
                &JointAngles {
                    base_yaw,
                    shoulder,
                    elbow: mid1,
                },
            );
            let d2 = self.distance_to(
                target,
                &JointAngles {
                    base_yaw,
                    shoulder,
                    elbow: mid2,
                },
            );

            best = if d1 < d2 { (d1, mid1) } else { (d2, mid2) };

            if d1 > d2 {
                lo = mid1;
            } else {
                hi = mid2;
            }
        }

        best
    }
}

/// Base yaw for a target bearing: `atan2`, shifted up a full turn when it
/// falls below -π/2.
///
/// The shift keeps the base inside its mechanical range without taking the ±π
/// alternative, which would swing the arm through a large unexpected rotation.
pub fn base_yaw(x: f64, y: f64) -> f64 {
    let yaw = y.atan2(x);
    if yaw < -FRAC_PI_2 { yaw + 2.0 * PI } else { yaw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_bounds() {
        assert!(ArmSolver::new(0.15, 0.15, 4).is_err());
        assert!(ArmSolver::new(0.15, 0.15, 101).is_err());
        assert!(ArmSolver::new(0.15, 0.15, 5).is_ok());
        assert!(ArmSolver::new(0.15, 0.15, 100).is_ok());
        assert_eq!(
            ArmSolver::new(0.15, 0.15, 0).unwrap_err(),
            Error::InvalidIterations(0)
        );
    }

    #[test]
    fn test_forward_kinematics_straight_out() {
        // Shoulder level, elbow at π: both segments point straight along x
        let solver = ArmSolver::new(0.15, 0.15, 10).unwrap();
        let p = solver.end_effector(&JointAngles {
            base_yaw: 0.0,
            shoulder: 0.0,
            elbow: PI,
        });
        assert!((p[0] - 0.3).abs() < 1e-12);
        assert!(p[1].abs() < 1e-12);
        assert!(p[2].abs() < 1e-12);
    }

    #[test]
    fn test_forward_kinematics_straight_up() {
        let solver = ArmSolver::new(0.2, 0.1, 10).unwrap();
        let p = solver.end_effector(&JointAngles {
            base_yaw: 1.0,
            shoulder: FRAC_PI_2,
            elbow: PI,
        });
        assert!(p[0].abs() < 1e-12);
        assert!(p[1].abs() < 1e-12);
        assert!((p[2] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_base_yaw_plain_quadrants() {
        assert!((base_yaw(1.0, 0.0)).abs() < 1e-12);
        assert!((base_yaw(1.0, 1.0) - PI / 4.0).abs() < 1e-12);
        assert!((base_yaw(0.0, 1.0) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_base_yaw_wraps_below_negative_half_pi() {
        // atan2(-1, -1) = -3π/4, below -π/2, so a full turn is added
        let yaw = base_yaw(-1.0, -1.0);
        assert!((yaw - 5.0 * PI / 4.0).abs() < 1e-12);
        assert!(yaw >= -FRAC_PI_2);

        // Just inside the limit: no shift
        let yaw = base_yaw(0.0, -1.0);
        assert!((yaw + FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_origin_target() {
        // Zero-norm target must not poison the search with NaN
        let solver = ArmSolver::new(0.15, 0.15, 20).unwrap();
        assert!(solver.solve([0.0, 0.0, 0.0], 0.0001).is_none());
    }
}
