#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Synthetic vascular trees for organ surfaces.
//!
//! The pipeline voxelizes an organ into demand and supply maps
//! ([`perfusion`]), writes one parameter file per vessel tree and runs an
//! external growth tool ([`vasculature`]), reads the grown trees
//! ([`parse`], [`graph`]) and turns each into a closed surface mesh of tubes
//! and bifurcation caps ([`branch`], [`model`]).

pub mod branch;
pub mod config;
pub mod geom;
pub mod graph;
pub mod model;
pub mod parse;
pub mod perfusion;
pub mod vasculature;

pub use config::{ConfigError, VascularConfig};
pub use graph::VesselGraph;
pub use model::{ModelOptions, TreeModel};
pub use perfusion::{MapParams, PerfusionMap};
pub use vasculature::{VasculatureGenerator, VesselDescriptor};
