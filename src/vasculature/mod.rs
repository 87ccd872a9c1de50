//! Orchestration of tree synthesis for one organ: demand maps, per-tree
//! parameters, the external growth tool and the surface meshes.

pub mod engine;
pub mod generator;
pub mod params;
pub mod profile;
pub mod sampling;

pub use engine::{GrowthError, GrowthRequest, GrownTree, ParameterFile, ProcessEngine, TreeGrowthEngine};
pub use generator::{GenerationError, GeneratorSettings, VasculatureGenerator};
pub use params::{PARAMETER_KEYS, ParameterError, Physiology, TreeParameters};
pub use profile::{
    GenericProfile, LiverProfile, OrganProfile, RadiusHeuristic, TreePlan, VesselDescriptor, VesselKind,
};
pub use sampling::TruncatedNormal;
