//! Scene configuration read from XML.
//!
//! ```xml
//! <vasculature seed="7" profile="liver">
//!   <map grid_width="100" supply="0.65 1 1 1"/>
//!   <physiology unit_length="0.001"/>
//!   <arterial_fraction mean="0.25" std_dev="0.05" low="0.15" high="0.35"/>
//!   <engine executable="VascuSynth" timeout_secs="600" max_attempts="3"/>
//!   <vessel name="portal_vein" kind="portal_vein" terminal_nodes="200" curved="true"/>
//!   <vessel name="hepatic_vein" kind="hepatic_vein" terminal_nodes="200"/>
//! </vasculature>
//! ```
//!
//! Every attribute and element is optional. `vessel` elements must be
//! consecutive.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_xml::de::from_str;
use serde::Deserialize;
use thiserror::Error;

use crate::branch::CurveOptions;
use crate::geom::SmoothOptions;
use crate::model::ModelOptions;
use crate::perfusion::MapParams;
use crate::vasculature::{
    GeneratorSettings, LiverProfile, Physiology, ProcessEngine, RadiusHeuristic, TruncatedNormal, VesselDescriptor,
    VesselKind,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration XML: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    Generic,
    Liver,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct VascularConfig {
    #[serde(rename = "@seed")]
    pub seed: u64,
    #[serde(rename = "@profile")]
    pub profile: ProfileKind,
    pub map: MapSection,
    pub physiology: PhysiologySection,
    pub viscosity: Option<TruncatedNormal>,
    pub arterial_fraction: Option<TruncatedNormal>,
    pub portal_y: Option<TruncatedNormal>,
    pub hepatic_y: Option<TruncatedNormal>,
    pub liver: LiverSection,
    pub radius_heuristic: RadiusSection,
    pub model: ModelSection,
    pub curves: CurveSection,
    pub engine: EngineSection,
    #[serde(rename = "vessel")]
    pub vessels: Vec<VesselSection>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapSection {
    #[serde(rename = "@grid_width")]
    pub grid_width: usize,
    #[serde(rename = "@voxelizer_tolerance")]
    pub voxelizer_tolerance: f64,
    #[serde(rename = "@occupancy_threshold")]
    pub occupancy_threshold: f64,
    #[serde(rename = "@erosion_fraction")]
    pub erosion_fraction: f64,
    #[serde(rename = "@fill_value")]
    pub fill_value: f64,
    /// Whitespace separated supply parameters.
    #[serde(rename = "@supply")]
    pub supply: String,
}

impl Default for MapSection {
    fn default() -> Self {
        let params = MapParams::default();
        let supply: Vec<String> = params.supply_parameters.iter().map(f64::to_string).collect();
        Self {
            grid_width: params.grid_width,
            voxelizer_tolerance: params.voxelizer_tolerance,
            occupancy_threshold: params.occupancy_threshold,
            erosion_fraction: params.erosion_fraction,
            fill_value: params.fill_value,
            supply: supply.join(" "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhysiologySection {
    #[serde(rename = "@density")]
    pub density: f64,
    #[serde(rename = "@flow_per_mass")]
    pub flow_per_mass: f64,
    #[serde(rename = "@unit_length")]
    pub unit_length: f64,
    #[serde(rename = "@term_pressure")]
    pub term_pressure: f64,
    #[serde(rename = "@gamma")]
    pub gamma: f64,
    #[serde(rename = "@lambda")]
    pub lambda: f64,
    #[serde(rename = "@mu")]
    pub mu: f64,
    #[serde(rename = "@min_distance")]
    pub min_distance: f64,
    #[serde(rename = "@closest_neighbours")]
    pub closest_neighbours: usize,
}

impl Default for PhysiologySection {
    fn default() -> Self {
        let p = Physiology::default();
        Self {
            density: p.density,
            flow_per_mass: p.flow_per_mass,
            unit_length: p.unit_length,
            term_pressure: p.term_pressure,
            gamma: p.gamma,
            lambda: p.lambda,
            mu: p.mu,
            min_distance: p.min_distance,
            closest_neighbours: p.closest_neighbours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LiverSection {
    #[serde(rename = "@x_tolerance_fraction")]
    pub x_tolerance_fraction: f64,
}

impl Default for LiverSection {
    fn default() -> Self {
        Self {
            x_tolerance_fraction: LiverProfile::default().x_tolerance_fraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RadiusSection {
    #[serde(rename = "@coefficient")]
    pub coefficient: f64,
    #[serde(rename = "@exponent")]
    pub exponent: f64,
    #[serde(rename = "@separation_factor")]
    pub separation_factor: f64,
    #[serde(rename = "@length_scale")]
    pub length_scale: f64,
}

impl Default for RadiusSection {
    fn default() -> Self {
        let r = RadiusHeuristic::default();
        Self {
            coefficient: r.coefficient,
            exponent: r.exponent,
            separation_factor: r.separation_factor,
            length_scale: r.length_scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    #[serde(rename = "@num_sides")]
    pub num_sides: usize,
    #[serde(rename = "@trim_step")]
    pub trim_step: f64,
    #[serde(rename = "@smoothing_iterations")]
    pub smoothing_iterations: usize,
    #[serde(rename = "@passband")]
    pub passband: f64,
    #[serde(rename = "@smooth_caps")]
    pub smooth_caps: bool,
}

impl Default for ModelSection {
    fn default() -> Self {
        let m = ModelOptions::default();
        Self {
            num_sides: m.num_sides,
            trim_step: m.trim_step,
            smoothing_iterations: m.smoothing.iterations,
            passband: m.smoothing.passband,
            smooth_caps: m.smooth_caps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurveSection {
    #[serde(rename = "@steps")]
    pub steps: usize,
    #[serde(rename = "@height_fraction")]
    pub height_fraction: f64,
    #[serde(rename = "@sweep_samples")]
    pub sweep_samples: usize,
}

impl Default for CurveSection {
    fn default() -> Self {
        let c = CurveOptions::default();
        Self {
            steps: c.steps,
            height_fraction: c.height_fraction,
            sweep_samples: c.sweep_samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    #[serde(rename = "@executable")]
    pub executable: String,
    #[serde(rename = "@timeout_secs")]
    pub timeout_secs: u64,
    #[serde(rename = "@max_attempts")]
    pub max_attempts: usize,
    #[serde(rename = "@poll_millis")]
    pub poll_millis: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            executable: "VascuSynth".to_owned(),
            timeout_secs: 600,
            max_attempts: 3,
            poll_millis: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VesselSection {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@kind")]
    pub kind: VesselKind,
    #[serde(rename = "@organ")]
    pub organ: String,
    #[serde(rename = "@terminal_nodes")]
    pub terminal_nodes: usize,
    #[serde(rename = "@pressure_gradient")]
    pub pressure_gradient: f64,
    #[serde(rename = "@curved")]
    pub curved: bool,
    /// Falls back to the model section.
    #[serde(rename = "@num_sides")]
    pub num_sides: Option<usize>,
}

impl Default for VesselSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: VesselKind::Other,
            organ: String::new(),
            terminal_nodes: 100,
            pressure_gradient: 70_000.0,
            curved: false,
            num_sides: None,
        }
    }
}

impl VascularConfig {
    pub fn from_xml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loading configuration from {}", path.display());
        Self::from_xml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.map.grid_width == 0 {
            return invalid("map grid_width must be positive".to_owned());
        }
        self.supply_parameters()?;
        if self.model.num_sides < 3 {
            return invalid(format!("model num_sides {} is below 3", self.model.num_sides));
        }
        if self.engine.max_attempts == 0 {
            return invalid("engine max_attempts must be positive".to_owned());
        }
        let mut names = BTreeSet::new();
        for vessel in &self.vessels {
            if vessel.name.is_empty() {
                return invalid("vessel without a name".to_owned());
            }
            if !names.insert(vessel.name.as_str()) {
                return invalid(format!("vessel `{}` listed twice", vessel.name));
            }
            if vessel.num_sides.is_some_and(|n| n < 3) {
                return invalid(format!("vessel `{}` needs at least 3 sides", vessel.name));
            }
        }
        Ok(())
    }

    fn supply_parameters(&self) -> Result<Vec<f64>, ConfigError> {
        self.map
            .supply
            .split_whitespace()
            .map(|v| {
                v.parse()
                    .map_err(|_| ConfigError::Invalid(format!("supply value `{v}` is not a number")))
            })
            .collect()
    }

    pub fn map_params(&self) -> Result<MapParams, ConfigError> {
        Ok(MapParams {
            grid_width: self.map.grid_width,
            voxelizer_tolerance: self.map.voxelizer_tolerance,
            occupancy_threshold: self.map.occupancy_threshold,
            erosion_fraction: self.map.erosion_fraction,
            fill_value: self.map.fill_value,
            supply_parameters: self.supply_parameters()?,
        })
    }

    #[must_use]
    pub fn physiology(&self) -> Physiology {
        let p = &self.physiology;
        Physiology {
            density: p.density,
            flow_per_mass: p.flow_per_mass,
            unit_length: p.unit_length,
            term_pressure: p.term_pressure,
            viscosity: self.viscosity.unwrap_or(Physiology::default().viscosity),
            gamma: p.gamma,
            lambda: p.lambda,
            mu: p.mu,
            min_distance: p.min_distance,
            closest_neighbours: p.closest_neighbours,
        }
    }

    #[must_use]
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            num_sides: self.model.num_sides,
            trim_step: self.model.trim_step,
            smoothing: SmoothOptions {
                iterations: self.model.smoothing_iterations,
                passband: self.model.passband,
            },
            smooth_caps: self.model.smooth_caps,
        }
    }

    #[must_use]
    pub fn curve_options(&self) -> CurveOptions {
        CurveOptions {
            steps: self.curves.steps,
            height_fraction: self.curves.height_fraction,
            sweep_samples: self.curves.sweep_samples,
            seed: self.seed,
        }
    }

    #[must_use]
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            physiology: self.physiology(),
            model: self.model_options(),
            curve: self.curve_options(),
            max_attempts: self.engine.max_attempts,
        }
    }

    #[must_use]
    pub fn vessel_descriptors(&self) -> Vec<VesselDescriptor> {
        self.vessels
            .iter()
            .map(|v| VesselDescriptor {
                organ: v.organ.clone(),
                pressure_gradient: v.pressure_gradient,
                curved: v.curved,
                num_sides: v.num_sides.unwrap_or(self.model.num_sides),
                ..VesselDescriptor::new(v.name.clone(), v.kind, v.terminal_nodes)
            })
            .collect()
    }

    #[must_use]
    pub fn liver_profile(&self) -> LiverProfile {
        let defaults = LiverProfile::default();
        let r = &self.radius_heuristic;
        LiverProfile {
            arterial_fraction: self.arterial_fraction.unwrap_or(defaults.arterial_fraction),
            portal_y: self.portal_y.unwrap_or(defaults.portal_y),
            hepatic_y: self.hepatic_y.unwrap_or(defaults.hepatic_y),
            x_tolerance_fraction: self.liver.x_tolerance_fraction,
            reference_centroid: None,
            radius: RadiusHeuristic {
                coefficient: r.coefficient,
                exponent: r.exponent,
                separation_factor: r.separation_factor,
                length_scale: r.length_scale,
            },
            unit_length: self.physiology.unit_length,
        }
    }

    #[must_use]
    pub fn process_engine(&self) -> ProcessEngine {
        ProcessEngine {
            poll_interval: Duration::from_millis(self.engine.poll_millis.max(1)),
            ..ProcessEngine::new(&self.engine.executable, Duration::from_secs(self.engine.timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"
<vasculature seed="7" profile="liver">
  <map grid_width="64" supply="0.5 1 1 1"/>
  <physiology unit_length="0.001" closest_neighbours="4"/>
  <viscosity mean="0.004" std_dev="0.0002" low="0.0035" high="0.0045"/>
  <radius_heuristic separation_factor="3"/>
  <model num_sides="12" smooth_caps="false"/>
  <engine executable="/opt/vascusynth/VascuSynth" timeout_secs="30" max_attempts="5"/>
  <vessel name="portal_vein" kind="portal_vein" terminal_nodes="200" curved="true"/>
  <vessel name="hepatic_vein" kind="hepatic_vein" terminal_nodes="150" num_sides="8"/>
  <vessel name="hepatic_artery" kind="hepatic_artery" terminal_nodes="50"/>
</vasculature>
"#;

    #[test]
    fn scene_overrides_defaults() {
        let config = VascularConfig::from_xml_str(SCENE).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.profile, ProfileKind::Liver);

        let map = config.map_params().unwrap();
        assert_eq!(map.grid_width, 64);
        assert_eq!(map.supply_parameters, vec![0.5, 1.0, 1.0, 1.0]);
        assert_eq!(map.occupancy_threshold, 0.5);

        let physiology = config.physiology();
        assert_eq!(physiology.unit_length, 0.001);
        assert_eq!(physiology.closest_neighbours, 4);
        assert_eq!(physiology.viscosity.mean, 0.004);
        assert_eq!(physiology.term_pressure, 63_000.0);

        let settings = config.generator_settings();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.model.num_sides, 12);
        assert!(!settings.model.smooth_caps);
        assert_eq!(settings.curve.seed, 7);

        let vessels = config.vessel_descriptors();
        assert_eq!(vessels.len(), 3);
        assert!(vessels[0].curved);
        assert_eq!(vessels[0].num_sides, 12);
        assert_eq!(vessels[1].num_sides, 8);
        assert_eq!(vessels[2].kind, VesselKind::HepaticArtery);

        let liver = config.liver_profile();
        assert_eq!(liver.radius.separation_factor, 3.0);
        assert_eq!(liver.radius.coefficient, 0.486_807_67);

        let engine = config.process_engine();
        assert_eq!(engine.timeout, Duration::from_secs(30));
    }

    #[test]
    fn empty_scene_uses_defaults() {
        let config = VascularConfig::from_xml_str("<vasculature/>").unwrap();
        assert_eq!(config.profile, ProfileKind::Generic);
        assert!(config.vessels.is_empty());
        assert_eq!(config.map_params().unwrap(), MapParams::default());
        assert_eq!(config.model_options(), ModelOptions::default());
        assert_eq!(config.physiology(), Physiology::default());
        assert_eq!(config.engine.executable, "VascuSynth");
    }

    #[test]
    fn invalid_scenes_are_rejected() {
        let bad_supply = r#"<vasculature><map supply="1 x"/></vasculature>"#;
        assert!(matches!(
            VascularConfig::from_xml_str(bad_supply),
            Err(ConfigError::Invalid(_))
        ));
        let twice = r#"<vasculature><vessel name="a"/><vessel name="a"/></vasculature>"#;
        assert!(matches!(VascularConfig::from_xml_str(twice), Err(ConfigError::Invalid(_))));
        let sides = r#"<vasculature><model num_sides="2"/></vasculature>"#;
        assert!(matches!(VascularConfig::from_xml_str(sides), Err(ConfigError::Invalid(_))));
    }
}
