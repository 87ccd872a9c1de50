//! Trimming of the three branches around a bifurcation until no branch end
//! disc is pierced by a neighbouring tube.
//!
//! Branches are handled as arms oriented away from the bifurcation centre, so
//! trimming always means raising `t_min`. The tube of the intersected arm is
//! approximated by the ray from the centre through its current end, projected
//! out to the distance of the tested end.

use std::collections::VecDeque;

use crate::branch::Branch;
use crate::geom::{Point3, Vec3};

/// Parameter step by which an end is trimmed per test.
pub const DEFAULT_TRIM_STEP: f64 = 0.02;

/// Upper bound on full sweeps over the pair queue.
const MAX_PASSES: usize = 8;

/// Ordered `(intersected, intersecting)` pairs; the second arm is the one trimmed.
const PAIR_ORDER: [(usize, usize); 6] = [(0, 1), (0, 2), (1, 2), (2, 1), (1, 0), (2, 0)];

/// One branch at a bifurcation, oriented with `t = 0` at the centre.
#[derive(Debug, Clone, PartialEq)]
pub struct Arm {
    pub branch: Branch,
    pub t_min: f64,
    pub t_max: f64,
}

impl Arm {
    #[must_use]
    pub fn new(branch: Branch, t_min: f64, t_max: f64) -> Self {
        Self {
            branch,
            t_min,
            t_max,
        }
    }

    /// Position of the end facing the centre.
    #[must_use]
    pub fn end(&self) -> Point3 {
        self.branch.evaluate(self.t_min)
    }

    /// Direction from `center` to the current end, or the tangent there when
    /// the end still sits on the centre.
    #[must_use]
    pub fn axis(&self, center: Point3) -> Vec3 {
        (self.end() - center)
            .normalized()
            .unwrap_or_else(|| self.branch.tangent_at(self.t_min))
    }
}

/// Whether the end disc of `intersecting` is pierced by the tube of `intersected`.
#[must_use]
pub fn end_disc_pierced(center: Point3, intersected: &Arm, intersecting: &Arm) -> bool {
    let end = intersecting.end();
    let distance = end.distance_to(center);
    let projected = center + intersected.axis(center) * distance;
    projected.distance_to(end) < intersected.branch.radius() + intersecting.branch.radius()
}

/// Outcome of [`resolve_conflicts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved { trims: usize },
    /// An arm ran out of parameter range.
    Collapsed { arm: usize },
    /// Still pierced after the pass bound.
    Unsettled,
}

impl Resolution {
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Runs the pair queue over `arms`. On anything but [`Resolution::Resolved`]
/// the arms are left as they were passed in.
pub fn resolve_conflicts(center: Point3, arms: &mut [Arm; 3], step: f64) -> Resolution {
    let original = arms.clone();
    let mut trims = 0usize;

    for _ in 0..MAX_PASSES {
        let mut queue: VecDeque<(usize, usize)> = PAIR_ORDER.into_iter().collect();
        let mut trimmed = false;

        while let Some((fixed, moving)) = queue.pop_front() {
            while end_disc_pierced(center, &arms[fixed], &arms[moving]) {
                if arms[moving].t_min + step >= arms[moving].t_max {
                    *arms = original;
                    return Resolution::Collapsed { arm: moving };
                }
                arms[moving].t_min += step;
                trims += 1;
                trimmed = true;
            }
        }

        if !trimmed {
            return Resolution::Resolved { trims };
        }
    }

    *arms = original;
    Resolution::Unsettled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::StraightBranch;

    fn arm(from: Point3, to: Point3, radius: f64) -> Arm {
        Arm::new(Branch::Straight(StraightBranch::new(from, to, radius)), 0.0, 1.0)
    }

    fn y_arms(child_half_angle: f64, radius: f64) -> [Arm; 3] {
        let (s, c) = child_half_angle.sin_cos();
        [
            arm(Point3::ORIGIN, Point3::new(0.0, 0.0, -1.0), radius),
            arm(Point3::ORIGIN, Point3::new(-s, 0.0, c), radius),
            arm(Point3::ORIGIN, Point3::new(s, 0.0, c), radius),
        ]
    }

    #[test]
    fn well_separated_bifurcation_is_trimmed_once_per_arm() {
        let mut arms = y_arms(std::f64::consts::FRAC_PI_3, 0.01);
        let outcome = resolve_conflicts(Point3::ORIGIN, &mut arms, DEFAULT_TRIM_STEP);
        assert_eq!(outcome, Resolution::Resolved { trims: 3 });
        for arm in &arms {
            assert!((arm.t_min - 0.02).abs() < 1e-12);
            assert_eq!(arm.t_max, 1.0);
        }
        for (a, b) in PAIR_ORDER {
            assert!(!end_disc_pierced(Point3::ORIGIN, &arms[a], &arms[b]));
        }
    }

    #[test]
    fn nearly_parallel_children_collapse_and_reset() {
        let mut arms = y_arms(0.005, 0.05);
        let before = arms.clone();
        let outcome = resolve_conflicts(Point3::ORIGIN, &mut arms, DEFAULT_TRIM_STEP);
        assert!(matches!(outcome, Resolution::Collapsed { arm: 2 }));
        assert_eq!(arms, before);
    }

    #[test]
    fn coincident_children_terminate() {
        let mut arms = [
            arm(Point3::ORIGIN, Point3::new(0.0, 0.0, -1.0), 0.2),
            arm(Point3::ORIGIN, Point3::new(0.0, 0.0, 1.0), 0.2),
            arm(Point3::ORIGIN, Point3::new(0.0, 0.0, 1.0), 0.2),
        ];
        assert!(!resolve_conflicts(Point3::ORIGIN, &mut arms, DEFAULT_TRIM_STEP).is_resolved());
    }

    #[test]
    fn already_trimmed_ranges_are_respected() {
        let mut arms = y_arms(std::f64::consts::FRAC_PI_3, 0.01);
        arms[1].t_max = 0.01;
        let outcome = resolve_conflicts(Point3::ORIGIN, &mut arms, DEFAULT_TRIM_STEP);
        assert_eq!(outcome, Resolution::Collapsed { arm: 1 });
    }
}
