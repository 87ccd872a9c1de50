//! Organ specialisations: how flow is split over the trees and where each
//! tree enters the organ.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use serde::Deserialize;

use super::sampling::TruncatedNormal;
use crate::geom::Point3;
use crate::perfusion::{LiverPerforationRequest, MapError, PerfusionMap, Voxel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselKind {
    PortalVein,
    HepaticVein,
    HepaticArtery,
    #[default]
    Other,
}

/// One requested vessel tree.
#[derive(Debug, Clone, PartialEq)]
pub struct VesselDescriptor {
    pub name: String,
    pub kind: VesselKind,
    pub organ: String,
    pub terminal_nodes: usize,
    /// Perfusion minus terminal pressure, Pa.
    pub pressure_gradient: f64,
    pub curved: bool,
    pub num_sides: usize,
    /// Filled in by `parametrize_trees`.
    pub perforation_point: Option<Voxel>,
    pub perforation_flow: Option<f64>,
}

impl VesselDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: VesselKind, terminal_nodes: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            organ: String::new(),
            terminal_nodes,
            pressure_gradient: 70_000.0,
            curved: false,
            num_sides: 16,
            perforation_point: None,
            perforation_flow: None,
        }
    }

    /// File the growth tool writes this tree to.
    #[must_use]
    pub fn output_filename(&self) -> String {
        format!("{}.gxl", self.name)
    }

    #[must_use]
    pub fn parameter_filename(&self) -> String {
        format!("{}_params.txt", self.name)
    }
}

/// A vessel with the flow and viscosity chosen for this run.
#[derive(Debug, Clone, PartialEq)]
pub struct TreePlan {
    pub vessel: VesselDescriptor,
    /// m³/s.
    pub flow: f64,
    /// Pa·s.
    pub viscosity: f64,
}

pub trait OrganProfile {
    /// Perfusion flow per vessel, in the order of `vessels`.
    fn split_flows(&self, total_flow: f64, vessels: &[VesselDescriptor], rng: &mut StdRng) -> Vec<f64>;

    /// Entry voxel per plan, `None` where no point could be found.
    fn perforation_points(
        &self,
        map: &PerfusionMap,
        plans: &[TreePlan],
        rng: &mut StdRng,
    ) -> Result<Vec<Option<Voxel>>, MapError>;
}

/// Even flow split and random boundary entry points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericProfile;

impl OrganProfile for GenericProfile {
    fn split_flows(&self, total_flow: f64, vessels: &[VesselDescriptor], _rng: &mut StdRng) -> Vec<f64> {
        let share = total_flow / vessels.len().max(1) as f64;
        vec![share; vessels.len()]
    }

    fn perforation_points(
        &self,
        map: &PerfusionMap,
        plans: &[TreePlan],
        rng: &mut StdRng,
    ) -> Result<Vec<Option<Voxel>>, MapError> {
        let mut points = map.find_boundary_points(rng).into_iter();
        Ok(plans.iter().map(|_| points.next()).collect())
    }
}

/// Upper bound on a root segment radius from Poiseuille's law, rescaled by
/// an empirical power law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusHeuristic {
    pub coefficient: f64,
    pub exponent: f64,
    /// Entry separation in multiples of the summed root radii.
    pub separation_factor: f64,
    /// Root segment length, mm.
    pub length_scale: f64,
}

impl Default for RadiusHeuristic {
    fn default() -> Self {
        Self {
            coefficient: 0.486_807_67,
            exponent: 0.650_820_38,
            separation_factor: 2.0,
            length_scale: 15.0,
        }
    }
}

impl RadiusHeuristic {
    /// Root radius in metres; 0 for non-positive inputs.
    #[must_use]
    pub fn root_radius(&self, flow: f64, pressure_gradient: f64, viscosity: f64) -> f64 {
        if !(flow > 0.0 && pressure_gradient > 0.0 && viscosity > 0.0) {
            return 0.0;
        }
        let length = self.length_scale * 1.0e-3;
        let poiseuille = (8.0 * viscosity * length * flow / (PI * pressure_gradient)).powf(0.25);
        self.coefficient * poiseuille.powf(self.exponent)
    }

    /// Minimal distance in metres between the entries of two trees.
    #[must_use]
    pub fn separation(&self, a: f64, b: f64) -> f64 {
        self.separation_factor * (a + b)
    }
}

/// Portal vein, hepatic vein and hepatic artery.
#[derive(Debug, Clone, PartialEq)]
pub struct LiverProfile {
    /// Share of the inflow carried by the artery.
    pub arterial_fraction: TruncatedNormal,
    /// y-fractions of the portal and hepatic vein entries.
    pub portal_y: TruncatedNormal,
    pub hepatic_y: TruncatedNormal,
    pub x_tolerance_fraction: f64,
    pub reference_centroid: Option<Point3>,
    pub radius: RadiusHeuristic,
    /// Metres per world unit, to express the separation in voxels.
    pub unit_length: f64,
}

impl Default for LiverProfile {
    fn default() -> Self {
        Self {
            arterial_fraction: TruncatedNormal::new(0.25, 0.05, 0.15, 0.35),
            portal_y: TruncatedNormal::new(0.35, 0.1, 0.0, 1.0),
            hepatic_y: TruncatedNormal::new(0.65, 0.1, 0.0, 1.0),
            x_tolerance_fraction: 0.2,
            reference_centroid: None,
            radius: RadiusHeuristic::default(),
            unit_length: 1.0,
        }
    }
}

impl LiverProfile {
    /// Ring distance in voxels between the portal vein and the artery.
    fn artery_distance(&self, portal: &TreePlan, artery: &TreePlan, pitch: f64) -> usize {
        let root = |plan: &TreePlan| {
            self.radius
                .root_radius(plan.flow, plan.vessel.pressure_gradient, plan.viscosity)
        };
        let metres = self.radius.separation(root(portal), root(artery));
        let voxels = metres / (self.unit_length * pitch);
        log::debug!("artery separation {metres:.5} m = {voxels:.2} voxels");
        if voxels.is_finite() {
            (voxels.ceil() as usize).max(1)
        } else {
            1
        }
    }
}

impl OrganProfile for LiverProfile {
    fn split_flows(&self, total_flow: f64, vessels: &[VesselDescriptor], rng: &mut StdRng) -> Vec<f64> {
        let fraction = self.arterial_fraction.sample(rng);
        log::debug!("arterial fraction {fraction:.3}");
        let others = vessels.iter().filter(|v| v.kind == VesselKind::Other).count();
        vessels
            .iter()
            .map(|v| match v.kind {
                VesselKind::HepaticArtery => fraction * total_flow,
                VesselKind::PortalVein => (1.0 - fraction) * total_flow,
                VesselKind::HepaticVein => total_flow,
                VesselKind::Other => total_flow / others.max(1) as f64,
            })
            .collect()
    }

    fn perforation_points(
        &self,
        map: &PerfusionMap,
        plans: &[TreePlan],
        rng: &mut StdRng,
    ) -> Result<Vec<Option<Voxel>>, MapError> {
        let find = |kind| plans.iter().find(|p| p.vessel.kind == kind);
        let (Some(portal), Some(hepatic)) = (find(VesselKind::PortalVein), find(VesselKind::HepaticVein)) else {
            log::warn!("liver profile without portal and hepatic vein, using boundary points");
            return GenericProfile.perforation_points(map, plans, rng);
        };
        let artery = find(VesselKind::HepaticArtery).map(|artery| {
            let distance = self.artery_distance(portal, artery, map.frame().pitch);
            (artery.vessel.name.clone(), distance)
        });

        let request = LiverPerforationRequest {
            primary: [
                (portal.vessel.name.clone(), self.portal_y),
                (hepatic.vessel.name.clone(), self.hepatic_y),
            ],
            artery,
            reference_centroid: self.reference_centroid,
            x_tolerance_fraction: self.x_tolerance_fraction,
        };
        let found = map.find_liver_perforation_points(&request, rng)?;

        let mut spare = map
            .find_boundary_points(rng)
            .into_iter()
            .filter(|p| !found.values().any(|q| q == p));
        Ok(plans
            .iter()
            .map(|plan| found.get(&plan.vessel.name).copied().or_else(|| spare.next()))
            .collect())
    }
}
