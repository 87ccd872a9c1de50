//! Sine-generated branches.
//!
//! The heading along the curve follows `θ(s) = ω sin(2πs / L)`. For a lateral
//! height `h` over a chord `D`, a second-order expansion of the height
//! integral gives `k (1 - ω²/4) = ω` with `k = π h / D`, hence
//! `ω = 2 (√(1 + k²) - 1) / k`. The arc length is `L = D / J0(ω)`.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Branch, BranchError, BranchFactory, StraightBranch};
use crate::geom::{Point3, Tolerance, Vec3};
use crate::graph::VesselGraph;
use crate::graph::edge::{CurveParams, EdgeId};

/// Above this angle the sine-generated curve folds onto itself. The closed
/// form above never exceeds 2; do not raise this without re-deriving it.
pub const OMEGA_MAX: f64 = 2.1;

const BESSEL_SAMPLES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveOptions {
    /// Integration steps per branch polyline.
    pub steps: usize,
    /// Default height as a fraction of `sqrt(D * max_length)`.
    pub height_fraction: f64,
    /// Rings per branch when sweeping the tube.
    pub sweep_samples: usize,
    pub seed: u64,
}

impl Default for CurveOptions {
    fn default() -> Self {
        Self {
            steps: 100,
            height_fraction: 0.1,
            sweep_samples: 48,
            seed: 0,
        }
    }
}

/// Curve angle for a branch of chord `distance` and lateral `height`, in `[0, OMEGA_MAX]`.
#[must_use]
pub fn sine_curve_omega(distance: f64, height: f64) -> f64 {
    if !(distance > 0.0) || !(height > 0.0) {
        return 0.0;
    }
    let k = PI * height / distance;
    let omega = 2.0 * ((1.0 + k * k).sqrt() - 1.0) / k;
    if omega.is_finite() {
        omega.clamp(0.0, OMEGA_MAX)
    } else {
        OMEGA_MAX
    }
}

/// `J0(ω) = (1/π) ∫₀^π cos(ω sin u) du`, midpoint rule.
fn bessel_j0(omega: f64) -> f64 {
    let du = PI / BESSEL_SAMPLES as f64;
    (0..BESSEL_SAMPLES)
        .map(|i| (omega * ((i as f64 + 0.5) * du).sin()).cos())
        .sum::<f64>()
        / BESSEL_SAMPLES as f64
}

/// Branch along an explicit polyline, parametrized by arc length.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvedBranch {
    points: Vec<Point3>,
    cumulative: Vec<f64>,
    radius: f64,
    omega: f64,
}

impl CurvedBranch {
    /// `points` needs at least two entries; shorter input is padded.
    #[must_use]
    pub fn from_polyline(mut points: Vec<Point3>, radius: f64, omega: f64) -> Self {
        if points.len() == 1 {
            points.push(points[0]);
        }
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in points.windows(2) {
            total += w[0].distance_to(w[1]);
            cumulative.push(total);
        }
        Self {
            points,
            cumulative,
            radius,
            omega,
        }
    }

    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub fn omega(&self) -> f64 {
        self.omega
    }

    /// Polyline length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Segment index and local parameter for curve parameter `t`.
    fn locate(&self, t: f64) -> (usize, f64) {
        let last_segment = self.points.len().saturating_sub(2);
        let s = t.clamp(0.0, 1.0) * self.length();
        let upper = self.cumulative.partition_point(|&c| c <= s);
        let seg = upper.saturating_sub(1).min(last_segment);
        let seg_len = self.cumulative[seg + 1] - self.cumulative[seg];
        let local = if seg_len > 0.0 {
            ((s - self.cumulative[seg]) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (seg, local)
    }

    #[must_use]
    pub fn evaluate(&self, t: f64) -> Point3 {
        match self.points.as_slice() {
            [] => Point3::ORIGIN,
            [first, ..] if t <= 0.0 => *first,
            [.., last] if t >= 1.0 => *last,
            points => {
                let (seg, local) = self.locate(t);
                points[seg].lerp(points[seg + 1], local)
            }
        }
    }

    /// Direction of the polyline segment containing `t` (not normalized).
    #[must_use]
    pub fn tangent_at(&self, t: f64) -> Vec3 {
        if self.points.len() < 2 {
            return Vec3::ZERO;
        }
        let (seg, _) = self.locate(t);
        self.points[seg + 1] - self.points[seg]
    }

    #[must_use]
    pub fn swapped(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self::from_polyline(points, self.radius, self.omega)
    }
}

/// Polyline of a sine-generated curve from `start` to `end`, bulging towards
/// `lateral`. Returns the points and `ω`, or `None` for a degenerate chord or
/// a lateral direction parallel to it.
#[must_use]
pub fn sine_generated_polyline(
    start: Point3,
    end: Point3,
    height: f64,
    lateral: Vec3,
    steps: usize,
) -> Option<(Vec<Point3>, f64)> {
    let steps = steps.max(2);
    let chord = end - start;
    let distance = chord.length();
    let u = chord.normalized()?;
    let w = (lateral - u * lateral.dot(u)).normalized()?;

    let omega = sine_curve_omega(distance, height);
    let arc = distance / bessel_j0(omega);
    let ds = arc / steps as f64;

    let mut local = Vec::with_capacity(steps + 1);
    let (mut x, mut y) = (0.0, 0.0);
    local.push((x, y));
    for i in 0..steps {
        let s_mid = (i as f64 + 0.5) * ds;
        let theta = omega * (2.0 * PI * s_mid / arc).sin();
        x += theta.cos() * ds;
        y += theta.sin() * ds;
        local.push((x, y));
    }

    let (ex, ey) = (x, y);
    let e_len = ex.hypot(ey);
    if e_len <= Tolerance::ZERO_LENGTH.eps {
        return None;
    }
    let scale = distance / e_len;
    let (cx, cy) = (ex / e_len, ey / e_len);

    let mut points: Vec<Point3> = local
        .iter()
        .map(|&(x, y)| {
            let along = (x * cx + y * cy) * scale;
            let across = (y * cx - x * cy) * scale;
            start + u * along + w * across
        })
        .collect();

    // Spread the residual integration drift over the curve, then pin the ends.
    if let Some(&last) = points.last() {
        let drift = end - last;
        for (i, p) in points.iter_mut().enumerate() {
            *p = *p + drift * (i as f64 / steps as f64);
        }
    }
    points[0] = start;
    points[steps] = end;
    Some((points, omega))
}

/// Factory for sine-generated branches. `max_length` is the longest straight
/// edge of the tree, fixed before any branch is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvedFactory {
    pub max_length: f64,
    pub options: CurveOptions,
}

impl CurvedFactory {
    #[must_use]
    pub fn new(max_length: f64, options: CurveOptions) -> Self {
        Self {
            max_length,
            options,
        }
    }

    /// Curve parameters for an edge without (usable) ones: a height derived
    /// from the chord and `max_length`, and a seeded lateral direction.
    #[must_use]
    pub fn derive_curve(&self, start: Point3, end: Point3, edge: EdgeId) -> Option<CurveParams> {
        let chord = end - start;
        let distance = chord.length();
        let u = chord.normalized()?;
        let height = (self.options.height_fraction * (distance * self.max_length).sqrt()).min(distance);

        let seed = self.options.seed ^ (edge.index() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(seed);
        let angle = rng.random::<f64>() * 2.0 * PI;
        let direction = u.any_perpendicular()?.rotated_around(u, angle);
        Some(CurveParams { height, direction })
    }

    fn usable_curve(curve: Option<CurveParams>, chord: Vec3) -> Option<CurveParams> {
        let curve = curve?;
        let u = chord.normalized()?;
        let lateral = curve.direction - u * curve.direction.dot(u);
        (curve.height.is_finite() && curve.height >= 0.0 && lateral.normalized().is_some())
            .then_some(curve)
    }
}

impl BranchFactory for CurvedFactory {
    fn make_branch(&self, graph: &VesselGraph, id: EdgeId) -> Result<Branch, BranchError> {
        let (start, end) = graph.endpoints(id).ok_or(BranchError::UnknownEdge(id))?;
        let edge = graph.edge(id).ok_or(BranchError::UnknownEdge(id))?;
        let straight = || Branch::Straight(StraightBranch::new(start, end, edge.radius));

        let curve = Self::usable_curve(edge.curve, end - start)
            .or_else(|| self.derive_curve(start, end, id));
        let Some(curve) = curve else {
            log::debug!("edge {id}: degenerate chord, using a straight branch");
            return Ok(straight());
        };

        match sine_generated_polyline(start, end, curve.height, curve.direction, self.options.steps) {
            Some((points, omega)) => Ok(Branch::Curved(CurvedBranch::from_polyline(
                points,
                edge.radius,
                omega,
            ))),
            None => {
                log::debug!("edge {id}: sine curve failed, using a straight branch");
                Ok(straight())
            }
        }
    }

    fn sweep_samples(&self) -> usize {
        self.options.sweep_samples
    }
}

/// Three-phase preparation of a curved tree: straight lengths, curvature
/// parameters and tortuosity, then arc lengths.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurvedTree;

impl CurvedTree {
    pub fn prepare(graph: &mut VesselGraph, options: CurveOptions) -> Result<CurvedFactory, BranchError> {
        graph.compute_lengths();
        let factory = CurvedFactory::new(graph.max_edge_length(), options);

        let ids: Vec<EdgeId> = graph.edge_ids().collect();
        for id in ids {
            let (start, end) = graph.endpoints(id).ok_or(BranchError::UnknownEdge(id))?;
            let current = graph.edge(id).and_then(|e| e.curve);
            if CurvedFactory::usable_curve(current, end - start).is_none() {
                let derived = factory.derive_curve(start, end, id);
                if let Some(edge) = graph.edge_mut(id) {
                    edge.curve = derived;
                }
            }

            let branch = factory.make_branch(graph, id)?;
            let chord = start.distance_to(end);
            let tortuosity = match &branch {
                Branch::Curved(b) if chord > 0.0 => b.length() / chord,
                _ => 1.0,
            };
            if let Some(edge) = graph.edge_mut(id) {
                edge.tortuosity = Some(tortuosity);
                edge.arc_length = edge.length.map(|length| length * tortuosity);
            }
        }

        log::debug!(
            "curved tree prepared: {} edges, max straight length {:.4}",
            graph.edge_count(),
            factory.max_length
        );
        Ok(factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{distance_point_polyline, distance_point_segment};
    use crate::graph::edge::Edge;

    #[test]
    fn omega_never_exceeds_fold_limit() {
        for distance in [1e-9, 1e-3, 0.5, 1.0, 42.0, 1e6] {
            for height in [0.0, 1e-12, 1e-3, 0.3, 1.0, 10.0, 1e9, f64::INFINITY] {
                let omega = sine_curve_omega(distance, height);
                assert!(
                    (0.0..=OMEGA_MAX).contains(&omega),
                    "omega {omega} for D={distance}, h={height}"
                );
            }
        }
        assert_eq!(sine_curve_omega(1.0, 0.0), 0.0);
    }

    #[test]
    fn bessel_matches_known_values() {
        assert!((bessel_j0(0.0) - 1.0).abs() < 1e-12);
        assert!((bessel_j0(1.0) - 0.765_197_686_557_966_6).abs() < 1e-9);
        assert!((bessel_j0(2.0) - 0.223_890_779_141_235_7).abs() < 1e-9);
    }

    #[test]
    fn endpoints_are_pinned_exactly() {
        let start = Point3::new(0.1, -3.7, 12.25);
        let end = Point3::new(4.3, 1.9, 10.0);
        let (points, omega) =
            sine_generated_polyline(start, end, 1.5, Vec3::new(0.0, 0.0, 1.0), 100).unwrap();
        assert!(omega > 0.0);
        let branch = CurvedBranch::from_polyline(points, 0.2, omega);
        assert_eq!(branch.evaluate(0.0), start);
        assert_eq!(branch.evaluate(1.0), end);
        assert_eq!(branch.swapped().evaluate(0.0), end);
    }

    #[test]
    fn lateral_height_matches_request() {
        let start = Point3::ORIGIN;
        let end = Point3::new(10.0, 0.0, 0.0);
        let (points, _) = sine_generated_polyline(start, end, 1.0, Vec3::Y, 200).unwrap();
        let max_y = points.iter().map(|p| p.y).fold(f64::MIN, f64::max);
        assert!((max_y - 1.0).abs() < 0.05, "height {max_y}");
        assert!(points.iter().all(|p| p.z.abs() < 1e-12));
        let mid = CurvedBranch::from_polyline(points, 0.1, 0.0).evaluate(0.5);
        assert!((mid.x - 5.0).abs() < 0.05);
    }

    #[test]
    fn prepare_sets_tortuosity_and_arc_length() {
        let mut graph = VesselGraph::new();
        let a = graph.add_node(Point3::ORIGIN);
        let b = graph.add_node(Point3::new(0.0, 0.0, 4.0));
        let c = graph.add_node(Point3::new(0.0, 1.0, 5.0));
        graph.add_edge(Edge::new(a, b, 0.3)).unwrap();
        graph
            .add_edge(Edge::new(b, c, 0.2).with_curve(0.2, Vec3::X))
            .unwrap();

        let factory = CurvedTree::prepare(&mut graph, CurveOptions::default()).unwrap();
        assert_eq!(factory.max_length, 4.0);
        for edge in graph.edges() {
            let tortuosity = edge.tortuosity.unwrap();
            assert!(tortuosity > 1.0);
            let expected = edge.length.unwrap() * tortuosity;
            assert!((edge.arc_length.unwrap() - expected).abs() < 1e-12);
            assert!(edge.curve.is_some());
        }
        // Provided curve parameters are kept.
        assert_eq!(graph.edges()[1].curve.unwrap().height, 0.2);

        let again = factory.make_branch(&graph, EdgeId::new(0)).unwrap();
        assert_eq!(again, factory.make_branch(&graph, EdgeId::new(0)).unwrap());
    }

    mod warnings {
        use std::sync::Mutex;
        use std::thread::{self, ThreadId};

        use log::{Level, LevelFilter, Log, Metadata, Record};

        struct Capture {
            records: Mutex<Vec<(ThreadId, String)>>,
        }

        impl Log for Capture {
            fn enabled(&self, metadata: &Metadata) -> bool {
                metadata.level() <= Level::Warn
            }

            fn log(&self, record: &Record) {
                if self.enabled(record.metadata()) {
                    if let Ok(mut records) = self.records.lock() {
                        records.push((thread::current().id(), record.args().to_string()));
                    }
                }
            }

            fn flush(&self) {}
        }

        static CAPTURE: Capture = Capture {
            records: Mutex::new(Vec::new()),
        };

        /// Warnings logged on the calling thread while `f` runs.
        pub fn during(f: impl FnOnce()) -> Vec<String> {
            if log::set_logger(&CAPTURE).is_ok() {
                log::set_max_level(LevelFilter::Warn);
            }
            let me = thread::current().id();
            let before = CAPTURE.records.lock().map(|r| r.len()).unwrap_or(0);
            f();
            CAPTURE.records.lock().map_or_else(
                |_| Vec::new(),
                |r| r[before..].iter().filter(|(id, _)| *id == me).map(|(_, m)| m.clone()).collect(),
            )
        }
    }

    #[test]
    fn prepare_measures_lengths_without_overwrite_warnings() {
        let mut graph = VesselGraph::new();
        let a = graph.add_node(Point3::ORIGIN);
        let b = graph.add_node(Point3::new(0.0, 0.0, 3.0));
        let c = graph.add_node(Point3::new(2.0, 0.0, 5.0));
        graph.add_edge(Edge::new(a, b, 0.3)).unwrap();
        graph.add_edge(Edge::new(b, c, 0.2)).unwrap();

        let warned = warnings::during(|| {
            CurvedTree::prepare(&mut graph, CurveOptions::default()).unwrap();
        });
        assert!(warned.is_empty(), "{warned:?}");
        for id in graph.edge_ids() {
            let (start, end) = graph.endpoints(id).unwrap();
            let edge = graph.edge(id).unwrap();
            assert_eq!(edge.length, Some(start.distance_to(end)));
            assert_eq!(edge.arc_length, Some(edge.length.unwrap() * edge.tortuosity.unwrap()));
        }
    }

    #[test]
    fn source_curve_traces_the_evaluated_branch() {
        let factory = CurvedFactory::new(4.0, CurveOptions::default());
        let mut graph = VesselGraph::new();
        let a = graph.add_node(Point3::ORIGIN);
        let b = graph.add_node(Point3::new(1.0, 2.0, 3.0));
        graph.add_edge(Edge::new(a, b, 0.1).with_curve(0.4, Vec3::X)).unwrap();

        let branch = factory.make_branch(&graph, EdgeId::new(0)).unwrap();
        let curve = branch.source_curve();
        assert_eq!(curve.len(), CurveOptions::default().steps + 1);
        assert_eq!((curve[0], curve[curve.len() - 1]), branch.endpoints());
        for i in 0..=20 {
            let p = branch.evaluate(f64::from(i) / 20.0);
            assert!(distance_point_polyline(p, &curve) < 1e-9);
        }
        let bulge = curve
            .iter()
            .map(|&p| distance_point_segment(p, curve[0], curve[curve.len() - 1]))
            .fold(0.0, f64::max);
        assert!((bulge - 0.4).abs() < 0.05, "bulge {bulge}");

        let straight = crate::branch::StraightFactory.make_branch(&graph, EdgeId::new(0)).unwrap();
        assert_eq!(straight.source_curve(), vec![Point3::ORIGIN, Point3::new(1.0, 2.0, 3.0)]);
    }
}
