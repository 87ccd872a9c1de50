//! Surface model of a vessel tree: swept tubes, bifurcation caps and end caps.

pub mod bifurcation;
pub mod builder;
pub mod conflict;
pub mod topology;

pub use bifurcation::{BifurcationCap, CapError, build_cap};
pub use builder::{FallbackReason, ModelError, ModelOptions, ModelReport, TreeModel, generate_model};
pub use conflict::{Arm, DEFAULT_TRIM_STEP, Resolution, end_disc_pierced, resolve_conflicts};
pub use topology::{Bifurcation, BranchTopology};
