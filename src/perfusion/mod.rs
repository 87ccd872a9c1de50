//! Oxygen demand and supply maps from an organ surface.
//!
//! The organ is voxelized on a cubic grid, holes are filled and the result is
//! eroded to keep the growth tool away from the surface.

pub mod map;
pub mod perforation;
pub mod voxel;

pub use map::{DemandMaps, MapError, MapParams, PerfusionMap};
pub use perforation::LiverPerforationRequest;
pub use voxel::{GridFrame, Voxel, VoxelGrid};
