//! Branch curves: the geometric representation of one tree edge.
//!
//! A [`Branch`] is immutable. Trimming near bifurcations is carried in a
//! separate [`TrimRange`], so conflict resolution can be re-run freely.

mod curved;
mod straight;

pub use curved::{CurveOptions, CurvedBranch, CurvedFactory, CurvedTree, OMEGA_MAX, sine_curve_omega};
pub use straight::{StraightBranch, StraightFactory};

use thiserror::Error;

use crate::geom::{Point3, RingFrame, Tolerance, Vec3};
use crate::graph::VesselGraph;
use crate::graph::edge::EdgeId;

/// Samples used for canonical frame transport along a branch.
const FRAME_SAMPLES: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BranchError {
    #[error("edge {0} does not exist or references a missing node")]
    UnknownEdge(EdgeId),
}

/// Usable parameter interval `[start, end] ⊆ [0, 1]` of a branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    pub const FULL: Self = Self {
        start: 0.0,
        end: 1.0,
    };

    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn span(self) -> f64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_full(self) -> bool {
        self == Self::FULL
    }
}

impl Default for TrimRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Straight or sine-generated branch; the model builder treats both alike.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Straight(StraightBranch),
    Curved(CurvedBranch),
}

impl Branch {
    /// Point at parameter `t ∈ [0, 1]`; `t = 0` and `t = 1` are the exact endpoints.
    #[must_use]
    pub fn evaluate(&self, t: f64) -> Point3 {
        match self {
            Self::Straight(b) => b.evaluate(t),
            Self::Curved(b) => b.evaluate(t),
        }
    }

    /// Polyline representation of the whole curve.
    #[must_use]
    pub fn source_curve(&self) -> Vec<Point3> {
        match self {
            Self::Straight(b) => vec![b.start, b.end],
            Self::Curved(b) => b.points().to_vec(),
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> (Point3, Point3) {
        (self.evaluate(0.0), self.evaluate(1.0))
    }

    /// Same curve traversed from the other end.
    #[must_use]
    pub fn swapped(&self) -> Self {
        match self {
            Self::Straight(b) => Self::Straight(b.swapped()),
            Self::Curved(b) => Self::Curved(b.swapped()),
        }
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        match self {
            Self::Straight(b) => b.radius,
            Self::Curved(b) => b.radius(),
        }
    }

    /// Unit tangent at `t`; `Vec3::Z` for a degenerate branch.
    #[must_use]
    pub fn tangent_at(&self, t: f64) -> Vec3 {
        let raw = match self {
            Self::Straight(b) => b.end - b.start,
            Self::Curved(b) => b.tangent_at(t),
        };
        raw.normalized().unwrap_or(Vec3::Z)
    }

    /// Canonical ring frame at `t`, parallel transported from `t = 0` over a
    /// fixed sampling so that frames agree however the branch is trimmed.
    #[must_use]
    pub fn frame_at(&self, t: f64) -> RingFrame {
        let tol = Tolerance::DEFAULT;
        let start = self.tangent_at(0.0);
        let mut frame = RingFrame::from_tangent(start).unwrap_or(RingFrame {
            tangent: Vec3::Z,
            normal: Vec3::X,
            binormal: Vec3::Y,
        });
        if matches!(self, Self::Straight(_)) {
            return frame;
        }

        let t = t.clamp(0.0, 1.0);
        let steps = (t * FRAME_SAMPLES as f64).floor() as usize;
        for i in 1..=steps {
            frame = frame.transported(self.tangent_at(i as f64 / FRAME_SAMPLES as f64), tol);
        }
        frame.transported(self.tangent_at(t), tol)
    }

    /// `count` points evenly spaced in parameter over `range` (at least 2).
    #[must_use]
    pub fn sample(&self, range: TrimRange, count: usize) -> Vec<(f64, Point3)> {
        let count = count.max(2);
        (0..count)
            .map(|i| {
                let t = if i + 1 == count {
                    range.end
                } else {
                    range.start + range.span() * i as f64 / (count - 1) as f64
                };
                (t, self.evaluate(t))
            })
            .collect()
    }
}

/// Builds the [`Branch`] of one graph edge.
pub trait BranchFactory {
    fn make_branch(&self, graph: &VesselGraph, edge: EdgeId) -> Result<Branch, BranchError>;

    /// Samples per unit parameter used when sweeping tubes.
    fn sweep_samples(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_range_defaults_to_full() {
        let range = TrimRange::default();
        assert!(range.is_full());
        assert_eq!(TrimRange::new(0.25, 0.75).span(), 0.5);
    }

    #[test]
    fn straight_frames_do_not_depend_on_t() {
        let branch = Branch::Straight(StraightBranch::new(
            Point3::ORIGIN,
            Point3::new(1.0, 1.0, 0.0),
            0.1,
        ));
        assert_eq!(branch.frame_at(0.0), branch.frame_at(0.7));
        let samples = branch.sample(TrimRange::new(0.5, 1.0), 3);
        assert_eq!(samples[1].0, 0.75);
        assert_eq!(samples[2].1, Point3::new(1.0, 1.0, 0.0));
    }
}
