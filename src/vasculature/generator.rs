//! End-to-end driver: organ surface to demand maps, parameter files, grown
//! trees and finally one surface mesh per tree.

use std::collections::BTreeMap;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use super::engine::{GrowthError, GrowthRequest, GrownTree, ParameterFile, TreeGrowthEngine};
use super::params::{Physiology, TreeParameters};
use super::profile::{OrganProfile, TreePlan, VesselDescriptor};
use crate::branch::{CurveOptions, CurvedTree, StraightFactory};
use crate::geom::GeomMesh;
use crate::graph::VesselGraph;
use crate::graph::edge::{ATTR_CURVE_HEIGHT, ATTR_RADIUS};
use crate::model::{ModelError, ModelOptions, TreeModel};
use crate::perfusion::{DemandMaps, GridFrame, MapError, MapParams, PerfusionMap, Voxel};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("demand maps have not been generated")]
    MissingMaps,
    #[error("trees have not been parametrized")]
    NotParametrized,
    #[error("no perforation point for any vessel")]
    NoPerforationPoints,
    #[error("tree growth failed after {attempts} attempts: {source}")]
    Growth {
        attempts: usize,
        #[source]
        source: GrowthError,
    },
    #[error("no tree model could be built")]
    NoModels,
}

/// Knobs of the whole pipeline apart from the vessels themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub physiology: Physiology,
    pub model: ModelOptions,
    pub curve: CurveOptions,
    pub max_attempts: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            physiology: Physiology::default(),
            model: ModelOptions::default(),
            curve: CurveOptions::default(),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct OrganMaps {
    map: PerfusionMap,
    maps: DemandMaps,
    volume: f64,
}

pub struct VasculatureGenerator<E, P> {
    engine: E,
    profile: P,
    vessels: Vec<VesselDescriptor>,
    settings: GeneratorSettings,
    seed: u64,
    rng: StdRng,
    organ: Option<OrganMaps>,
    parameter_files: Vec<ParameterFile>,
}

impl<E: TreeGrowthEngine, P: OrganProfile> VasculatureGenerator<E, P> {
    #[must_use]
    pub fn new(engine: E, profile: P, vessels: Vec<VesselDescriptor>, settings: GeneratorSettings, seed: u64) -> Self {
        Self {
            engine,
            profile,
            vessels,
            settings,
            seed,
            rng: StdRng::seed_from_u64(seed),
            organ: None,
            parameter_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[must_use]
    pub fn vessels(&self) -> &[VesselDescriptor] {
        &self.vessels
    }

    #[must_use]
    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    #[must_use]
    pub fn perfusion_map(&self) -> Option<&PerfusionMap> {
        self.organ.as_ref().map(|o| &o.map)
    }

    /// Grid of the growth tool; positions map to the organ as `origin + p * pitch`.
    #[must_use]
    pub fn grid_frame(&self) -> Option<&GridFrame> {
        self.perfusion_map().map(PerfusionMap::frame)
    }

    /// Organ volume in world units, valid after [`Self::generate_demand_maps`].
    #[must_use]
    pub fn organ_volume(&self) -> Option<f64> {
        self.organ.as_ref().map(|o| o.volume)
    }

    /// Voxelizes the organ and caches the map, its grid frame and the organ
    /// volume (exact for closed surfaces, voxel count otherwise).
    pub fn generate_demand_maps(&mut self, organ: &GeomMesh, params: &MapParams) -> Result<&DemandMaps, GenerationError> {
        let map = PerfusionMap::compute(organ, params)?;
        let volume = if organ.open_edge_count() == 0 {
            organ.enclosed_volume()
        } else {
            log::warn!("organ surface is open, volume taken from the voxel map");
            map.occupied_volume()
        };
        log::info!(
            "demand map {:?} with {} occupied voxels, organ volume {volume:.6}",
            map.frame().dims,
            map.occupancy().count()
        );
        let maps = map.maps();
        self.parameter_files.clear();
        let organ = self.organ.insert(OrganMaps { map, maps, volume });
        Ok(&organ.maps)
    }

    /// Shuffled boundary voxels of the occupancy map.
    pub fn random_perforation_points(&mut self) -> Result<Vec<Voxel>, GenerationError> {
        let organ = self.organ.as_ref().ok_or(GenerationError::MissingMaps)?;
        Ok(organ.map.find_boundary_points(&mut self.rng))
    }

    /// Chooses flow, viscosity and entry point per vessel and returns the
    /// parameter file texts by file name. Vessels without an entry point are
    /// dropped with a warning.
    pub fn parametrize_trees(&mut self) -> Result<BTreeMap<String, String>, GenerationError> {
        let organ = self.organ.as_ref().ok_or(GenerationError::MissingMaps)?;
        let physiology = self.settings.physiology;
        let total_flow = physiology.total_flow(organ.volume);
        let flows = self.profile.split_flows(total_flow, &self.vessels, &mut self.rng);

        let plans: Vec<TreePlan> = self
            .vessels
            .iter()
            .zip(flows)
            .map(|(vessel, flow)| TreePlan {
                vessel: vessel.clone(),
                flow,
                viscosity: physiology.viscosity.sample(&mut self.rng),
            })
            .collect();
        let points = self.profile.perforation_points(&organ.map, &plans, &mut self.rng)?;
        let voxel_width = organ.map.frame().pitch * physiology.unit_length;

        self.parameter_files.clear();
        let mut texts = BTreeMap::new();
        for (index, (plan, point)) in plans.iter().zip(points).enumerate() {
            let Some(point) = point else {
                log::warn!("no perforation point for `{}`, tree skipped", plan.vessel.name);
                continue;
            };
            let parameters = TreeParameters {
                perf_point: point,
                perf_pressure: physiology.term_pressure + plan.vessel.pressure_gradient,
                term_pressure: physiology.term_pressure,
                perf_flow: plan.flow,
                rho: plan.viscosity,
                gamma: physiology.gamma,
                lambda: physiology.lambda,
                mu: physiology.mu,
                min_distance: physiology.min_distance,
                num_nodes: plan.vessel.terminal_nodes,
                voxel_width,
                closest_neighbours: physiology.closest_neighbours,
                output_filename: plan.vessel.output_filename(),
                random_seed: self.seed.wrapping_add(index as u64),
            };
            log::info!(
                "`{}`: entry {point:?}, flow {:.4e} m³/s, viscosity {:.5}",
                plan.vessel.name,
                plan.flow,
                plan.viscosity
            );
            if let Some(vessel) = self.vessels.iter_mut().find(|v| v.name == plan.vessel.name) {
                vessel.perforation_point = Some(point);
                vessel.perforation_flow = Some(plan.flow);
            }
            let file_name = plan.vessel.parameter_filename();
            texts.insert(file_name.clone(), parameters.to_text());
            self.parameter_files.push(ParameterFile { file_name, parameters });
        }

        if self.parameter_files.is_empty() {
            return Err(GenerationError::NoPerforationPoints);
        }
        Ok(texts)
    }

    /// Runs the growth engine, retrying the same inputs up to `max_attempts`
    /// times.
    pub fn generate_structure(&self, seed: u64, working_dir: &Path) -> Result<Vec<GrownTree>, GenerationError> {
        let organ = self.organ.as_ref().ok_or(GenerationError::MissingMaps)?;
        if self.parameter_files.is_empty() {
            return Err(GenerationError::NotParametrized);
        }
        let request = GrowthRequest {
            maps: organ.maps.clone(),
            parameter_files: self.parameter_files.clone(),
            working_dir: working_dir.to_path_buf(),
            seed,
        };

        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.engine.grow(&request) {
                Ok(trees) => {
                    log::info!("grew {} trees on attempt {attempt}", trees.len());
                    return Ok(trees);
                }
                Err(source) if attempt >= attempts => {
                    return Err(GenerationError::Growth { attempts, source });
                }
                Err(err) => {
                    log::warn!("growth attempt {attempt} of {attempts} failed: {err}");
                    attempt += 1;
                }
            }
        }
    }

    /// Pairs grown trees with their descriptors by output file name.
    #[must_use]
    pub fn pair_trees(&self, grown: Vec<GrownTree>) -> Vec<(VesselDescriptor, VesselGraph)> {
        grown
            .into_iter()
            .filter_map(|tree| {
                let vessel = self
                    .vessels
                    .iter()
                    .find(|v| v.output_filename() == tree.output_filename);
                if vessel.is_none() {
                    log::warn!("grown tree `{}` matches no vessel", tree.output_filename);
                }
                vessel.map(|v| (v.clone(), tree.graph))
            })
            .collect()
    }

    /// Moves every tree from grid to organ coordinates and meshes it. A tree
    /// that fails is skipped with a warning; only an all-failed batch errors.
    pub fn generate_3d_representation(
        &self,
        trees: Vec<(VesselDescriptor, VesselGraph)>,
    ) -> Result<BTreeMap<String, TreeModel>, GenerationError> {
        let frame = *self.grid_frame().ok_or(GenerationError::MissingMaps)?;
        if trees.is_empty() {
            return Ok(BTreeMap::new());
        }
        let settings = &self.settings;

        cfg_if::cfg_if! {
            if #[cfg(feature = "parallel")] {
                let built: Vec<_> = trees
                    .into_par_iter()
                    .map(|(vessel, graph)| build_tree_model(&frame, settings, &vessel, graph))
                    .collect();
            } else {
                let built: Vec<_> = trees
                    .into_iter()
                    .map(|(vessel, graph)| build_tree_model(&frame, settings, &vessel, graph))
                    .collect();
            }
        }

        let models: BTreeMap<String, TreeModel> = built.into_iter().flatten().collect();
        if models.is_empty() {
            return Err(GenerationError::NoModels);
        }
        Ok(models)
    }

    /// All stages in order for one organ.
    pub fn run(
        &mut self,
        organ: &GeomMesh,
        params: &MapParams,
        working_dir: &Path,
    ) -> Result<BTreeMap<String, TreeModel>, GenerationError> {
        self.generate_demand_maps(organ, params)?;
        self.parametrize_trees()?;
        let grown = self.generate_structure(self.seed, working_dir)?;
        let trees = self.pair_trees(grown);
        self.generate_3d_representation(trees)
    }
}

fn build_tree_model(
    frame: &GridFrame,
    settings: &GeneratorSettings,
    vessel: &VesselDescriptor,
    mut graph: VesselGraph,
) -> Option<(String, TreeModel)> {
    graph.rescale_and_translate(frame.origin, frame.pitch);
    if graph.edges().iter().any(|e| e.curve.is_some()) {
        graph.scale_edge_attributes(&[ATTR_RADIUS, ATTR_CURVE_HEIGHT], &[frame.pitch, frame.pitch]);
    } else {
        graph.scale_edge_attributes(&[ATTR_RADIUS], &[frame.pitch]);
    }

    let options = ModelOptions {
        num_sides: vessel.num_sides,
        ..settings.model
    };
    let built = if vessel.curved {
        let curve = CurveOptions {
            seed: settings.curve.seed ^ hash_name(&vessel.name),
            ..settings.curve
        };
        CurvedTree::prepare(&mut graph, curve)
            .map_err(ModelError::from)
            .and_then(|factory| TreeModel::build(&graph, &factory, &options))
    } else {
        TreeModel::build(&graph, &StraightFactory, &options)
    };

    match built {
        Ok(model) => {
            log::info!(
                "`{}`: {} vertices, {} capped and {} fallback bifurcations",
                vessel.name,
                model.mesh.vertex_count(),
                model.report.capped.len(),
                model.report.fallback.len()
            );
            Some((format!("{}.obj", vessel.name), model))
        }
        Err(err) => {
            log::warn!("`{}` skipped: {err}", vessel.name);
            None
        }
    }
}

/// FNV-1a, to give every curved tree its own lateral directions.
fn hash_name(name: &str) -> u64 {
    name.bytes()
        .fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::geom::Point3;
    use crate::graph::edge::Edge;
    use crate::graph::node::NodeId;
    use crate::vasculature::profile::{GenericProfile, VesselKind};

    /// Fails a fixed number of times, then returns a two-edge tree per file.
    struct FlakyEngine {
        failures: Cell<usize>,
    }

    impl TreeGrowthEngine for FlakyEngine {
        fn grow(&self, request: &GrowthRequest) -> Result<Vec<GrownTree>, GrowthError> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(GrowthError::Failed {
                    status: Some(1),
                    stdout: String::new(),
                    stderr: "did not converge".to_owned(),
                });
            }
            Ok(request
                .parameter_files
                .iter()
                .map(|file| GrownTree {
                    output_filename: file.parameters.output_filename.clone(),
                    graph: line_graph(),
                })
                .collect())
        }
    }

    fn line_graph() -> VesselGraph {
        let mut graph = VesselGraph::new();
        let a = graph.add_node(Point3::new(2.0, 2.0, 2.0));
        let b = graph.add_node(Point3::new(2.0, 2.0, 6.0));
        let c = graph.add_node(Point3::new(2.0, 2.0, 10.0));
        graph.add_edge(Edge::new(a, b, 0.5)).unwrap();
        graph.add_edge(Edge::new(b, c, 0.4)).unwrap();
        graph
    }

    fn flaky_generator(failures: usize, max_attempts: usize) -> VasculatureGenerator<FlakyEngine, GenericProfile> {
        let vessels = vec![
            VesselDescriptor::new("portal", VesselKind::PortalVein, 20),
            VesselDescriptor::new("hepatic", VesselKind::HepaticVein, 20),
        ];
        let settings = GeneratorSettings {
            max_attempts,
            ..GeneratorSettings::default()
        };
        let engine = FlakyEngine {
            failures: Cell::new(failures),
        };
        VasculatureGenerator::new(engine, GenericProfile, vessels, settings, 17)
    }

    fn unit_cube() -> GeomMesh {
        GeomMesh::cuboid(Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0))
    }

    fn params() -> MapParams {
        MapParams {
            grid_width: 16,
            ..MapParams::default()
        }
    }

    #[test]
    fn stages_must_run_in_order() {
        let mut generator = flaky_generator(0, 1);
        assert!(matches!(generator.parametrize_trees(), Err(GenerationError::MissingMaps)));
        generator.generate_demand_maps(&unit_cube(), &params()).unwrap();
        let dir = std::env::temp_dir();
        assert!(matches!(
            generator.generate_structure(1, &dir),
            Err(GenerationError::NotParametrized)
        ));
    }

    #[test]
    fn parametrization_records_points_and_flows() {
        let mut generator = flaky_generator(0, 1);
        generator.generate_demand_maps(&unit_cube(), &params()).unwrap();
        assert!((generator.organ_volume().unwrap() - 1.0).abs() < 1e-9);
        let texts = generator.parametrize_trees().unwrap();
        assert_eq!(
            texts.keys().collect::<Vec<_>>(),
            ["hepatic_params.txt", "portal_params.txt"]
        );
        let flows: Vec<f64> = generator.vessels().iter().filter_map(|v| v.perforation_flow).collect();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0], flows[1]);
        let portal = TreeParameters::parse(&texts["portal_params.txt"]).unwrap();
        assert_eq!(portal.output_filename, "portal.gxl");
        assert_eq!(portal.perf_pressure, 133_000.0);
        assert_eq!(Some(portal.perf_point), generator.vessels()[0].perforation_point);
    }

    #[test]
    fn growth_is_retried_up_to_the_bound() {
        let dir = std::env::temp_dir();
        let mut generator = flaky_generator(2, 3);
        generator.generate_demand_maps(&unit_cube(), &params()).unwrap();
        generator.parametrize_trees().unwrap();
        assert_eq!(generator.generate_structure(1, &dir).unwrap().len(), 2);

        let mut generator = flaky_generator(3, 3);
        generator.generate_demand_maps(&unit_cube(), &params()).unwrap();
        generator.parametrize_trees().unwrap();
        assert!(matches!(
            generator.generate_structure(1, &dir),
            Err(GenerationError::Growth { attempts: 3, .. })
        ));
    }

    #[test]
    fn models_are_placed_in_organ_coordinates() {
        let mut generator = flaky_generator(0, 1);
        let models = generator
            .run(&unit_cube(), &params(), &std::env::temp_dir())
            .unwrap();
        assert_eq!(models.keys().collect::<Vec<_>>(), ["hepatic.obj", "portal.obj"]);
        let bbox = models["portal.obj"].mesh.bbox().unwrap();
        let pitch = generator.grid_frame().unwrap().pitch;
        // Node at grid z = 10 with radius 0.4 voxels.
        assert!((bbox.max.z - 10.0 * pitch).abs() < 1e-9);
        assert!((bbox.max.x - (2.0 + 0.5) * pitch).abs() < 0.05 * pitch);
        assert!(!models["portal.obj"].report.is_capped(NodeId(1)));
    }

    #[test]
    fn unmatched_trees_are_dropped() {
        let generator = flaky_generator(0, 1);
        let grown = vec![GrownTree {
            output_filename: "unknown.gxl".to_owned(),
            graph: line_graph(),
        }];
        assert!(generator.pair_trees(grown).is_empty());
        let no_maps = generator.generate_3d_representation(Vec::new());
        assert!(matches!(no_maps, Err(GenerationError::MissingMaps)));
    }
}
