//! Per-tree parameter files of the growth tool (`KEY: value` lines).

use std::fmt::Write as _;

use thiserror::Error;

use super::sampling::TruncatedNormal;
use crate::perfusion::Voxel;

pub const PARAMETER_KEYS: [&str; 14] = [
    "PERF_POINT",
    "PERF_PRESSURE",
    "TERM_PRESSURE",
    "PERF_FLOW",
    "RHO",
    "GAMMA",
    "LAMBDA",
    "MU",
    "MIN_DISTANCE",
    "NUM_NODES",
    "VOXEL_WIDTH",
    "CLOSEST_NEIGHBOURS",
    "OUTPUT_FILENAME",
    "RANDOM_SEED",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("line {0} is not a `KEY: value` pair")]
    Malformed(usize),
    #[error("parameter {0} is missing")]
    MissingKey(&'static str),
    #[error("parameter {key} has invalid value `{value}`")]
    InvalidValue { key: &'static str, value: String },
}

/// Physiological constants shared by every tree of an organ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Physiology {
    /// Tissue density, kg/m³.
    pub density: f64,
    /// Blood flow per tissue mass, m³/s per kg.
    pub flow_per_mass: f64,
    /// Metres per world unit of the organ mesh.
    pub unit_length: f64,
    pub term_pressure: f64,
    /// Blood viscosity, Pa·s.
    pub viscosity: TruncatedNormal,
    pub gamma: f64,
    pub lambda: f64,
    pub mu: f64,
    pub min_distance: f64,
    pub closest_neighbours: usize,
}

impl Default for Physiology {
    fn default() -> Self {
        Self {
            density: 1060.0,
            flow_per_mass: 1.0e-6 / 60.0 / 1.0e-3,
            unit_length: 1.0,
            term_pressure: 63_000.0,
            viscosity: TruncatedNormal::new(0.0036, 0.0004, 0.003, 0.0045),
            gamma: 3.0,
            lambda: 2.0,
            mu: 1.0,
            min_distance: 1.0,
            closest_neighbours: 5,
        }
    }
}

impl Physiology {
    /// Total perfusion flow (m³/s) of an organ of `volume` world units³.
    #[must_use]
    pub fn total_flow(&self, volume: f64) -> f64 {
        self.density * volume * self.unit_length.powi(3) * self.flow_per_mass
    }
}

/// Contents of one parameter file.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParameters {
    pub perf_point: Voxel,
    pub perf_pressure: f64,
    pub term_pressure: f64,
    pub perf_flow: f64,
    pub rho: f64,
    pub gamma: f64,
    pub lambda: f64,
    pub mu: f64,
    pub min_distance: f64,
    pub num_nodes: usize,
    pub voxel_width: f64,
    pub closest_neighbours: usize,
    pub output_filename: String,
    pub random_seed: u64,
}

impl TreeParameters {
    #[must_use]
    pub fn to_text(&self) -> String {
        let [x, y, z] = self.perf_point;
        let mut out = String::new();
        let _ = writeln!(out, "PERF_POINT: {x} {y} {z}");
        let _ = writeln!(out, "PERF_PRESSURE: {}", self.perf_pressure);
        let _ = writeln!(out, "TERM_PRESSURE: {}", self.term_pressure);
        let _ = writeln!(out, "PERF_FLOW: {}", self.perf_flow);
        let _ = writeln!(out, "RHO: {}", self.rho);
        let _ = writeln!(out, "GAMMA: {}", self.gamma);
        let _ = writeln!(out, "LAMBDA: {}", self.lambda);
        let _ = writeln!(out, "MU: {}", self.mu);
        let _ = writeln!(out, "MIN_DISTANCE: {}", self.min_distance);
        let _ = writeln!(out, "NUM_NODES: {}", self.num_nodes);
        let _ = writeln!(out, "VOXEL_WIDTH: {}", self.voxel_width);
        let _ = writeln!(out, "CLOSEST_NEIGHBOURS: {}", self.closest_neighbours);
        let _ = writeln!(out, "OUTPUT_FILENAME: {}", self.output_filename);
        let _ = writeln!(out, "RANDOM_SEED: {}", self.random_seed);
        out
    }

    /// Reads a parameter file; unknown keys are ignored, every known key is required.
    pub fn parse(text: &str) -> Result<Self, ParameterError> {
        let mut values: [Option<&str>; 14] = [None; 14];
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or(ParameterError::Malformed(number + 1))?;
            if let Some(slot) = PARAMETER_KEYS.iter().position(|k| *k == key.trim()) {
                values[slot] = Some(value.trim());
            } else {
                log::debug!("ignoring unknown parameter `{}`", key.trim());
            }
        }

        let raw = |slot: usize| values[slot].ok_or(ParameterError::MissingKey(PARAMETER_KEYS[slot]));
        let num = |slot: usize| -> Result<f64, ParameterError> {
            let value = raw(slot)?;
            value.parse().map_err(|_| ParameterError::InvalidValue {
                key: PARAMETER_KEYS[slot],
                value: value.to_owned(),
            })
        };
        let int = |slot: usize| -> Result<u64, ParameterError> {
            let value = raw(slot)?;
            value.parse().map_err(|_| ParameterError::InvalidValue {
                key: PARAMETER_KEYS[slot],
                value: value.to_owned(),
            })
        };

        let point_text = raw(0)?;
        let coords: Vec<usize> = point_text
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| ParameterError::InvalidValue {
                key: PARAMETER_KEYS[0],
                value: point_text.to_owned(),
            })?;
        let perf_point: Voxel = coords.try_into().map_err(|_| ParameterError::InvalidValue {
            key: PARAMETER_KEYS[0],
            value: point_text.to_owned(),
        })?;

        Ok(Self {
            perf_point,
            perf_pressure: num(1)?,
            term_pressure: num(2)?,
            perf_flow: num(3)?,
            rho: num(4)?,
            gamma: num(5)?,
            lambda: num(6)?,
            mu: num(7)?,
            min_distance: num(8)?,
            num_nodes: int(9)? as usize,
            voxel_width: num(10)?,
            closest_neighbours: int(11)? as usize,
            output_filename: raw(12)?.to_owned(),
            random_seed: int(13)?,
        })
    }
}
