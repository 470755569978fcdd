//! Integrator and mesh mutator options.
//!
//! These control numerics only; physical moduli live in `Parameters`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, SimulationError};

/// What to do when forces vanish but area/volume constraints are unmet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintPolicy {
    /// λ += K·residual
    AugmentedLagrangian,
    /// K *= 1.3
    IncrementalPenalty,
}

/// Time stepping scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationScheme {
    /// Overdamped forward Euler
    Euler,
    /// Inertial dynamics with the DPD thermostat
    VelocityVerlet,
    /// Fletcher–Reeves nonlinear conjugate gradient
    ConjugateGradient,
}

/// Time stepping options shared by all schemes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorOptions {
    pub scheme: IntegrationScheme,
    /// Characteristic time step dt0
    pub time_step: f64,
    /// Simulation time after which the run fails
    pub total_time: f64,
    /// Steps between saved frames
    pub save_period: usize,
    /// Force norm below which the run may converge
    pub tolerance: f64,
    /// Relative area/volume residual below which constraints are met
    pub constraint_tolerance: f64,
    pub constraint_policy: ConstraintPolicy,
    pub is_backtrack: bool,
    /// Step shrink factor ρ
    pub rho: f64,
    /// Sufficient decrease coefficient c1
    pub c1: f64,
    /// Rescale dt by min edge length² over max force
    pub is_adaptive_step: bool,
    /// Steps between mesh mutations; 0 disables
    pub process_mesh_period: usize,
    /// Steps between geodesic refreshes; 0 disables
    pub update_geodesics_period: usize,
    /// Conjugate gradient restart period
    pub restart_period: usize,
    pub seed: u64,
    pub mutator: MeshMutatorOptions,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::Euler,
            time_step: 0.1,
            total_time: 1000.0,
            save_period: 50,
            tolerance: 1e-5,
            constraint_tolerance: 1e-3,
            constraint_policy: ConstraintPolicy::AugmentedLagrangian,
            is_backtrack: true,
            rho: 0.99,
            c1: 1e-4,
            is_adaptive_step: false,
            process_mesh_period: 0,
            update_geodesics_period: 0,
            restart_period: 20,
            seed: 0,
            mutator: MeshMutatorOptions::default(),
        }
    }
}

impl IntegratorOptions {
    /// Load options from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let options = serde_json::from_str(&contents)?;
        Ok(options)
    }

    /// Load options, or use defaults if the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(options) => {
                log::info!("Loaded integrator options from {:?}", path.as_ref());
                options
            }
            Err(SimulationError::Io(_)) => {
                log::info!("Integrator options file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to read integrator options: {}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(ConfigError::OutOfRange {
                name: "time_step",
                requirement: "finite and positive",
                value: self.time_step,
            });
        }
        if !(self.tolerance >= 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "tolerance",
                requirement: "non-negative",
                value: self.tolerance,
            });
        }
        if self.is_backtrack {
            if !(self.rho > 0.0 && self.rho < 1.0) {
                return Err(ConfigError::OutOfRange {
                    name: "rho",
                    requirement: "in the open interval (0, 1)",
                    value: self.rho,
                });
            }
            if !(self.c1 > 0.0 && self.c1 < 1.0) {
                return Err(ConfigError::OutOfRange {
                    name: "c1",
                    requirement: "in the open interval (0, 1)",
                    value: self.c1,
                });
            }
        }
        if self.save_period == 0 {
            return Err(ConfigError::OutOfRange {
                name: "save_period",
                requirement: "at least 1",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Post-mutation smoothing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    None,
    /// Gradient descent on the outlier bending force until its norm drops
    /// to `target` times the initial norm
    Global {
        target: f64,
        initial_step: f64,
        max_iterations: usize,
    },
    /// Laplacian-of-curvature relaxation around touched vertices
    Local { iterations: usize, step: f64 },
}

/// Remeshing toggles and thresholds
///
/// Zero length and area thresholds are replaced by values derived from the
/// initial mesh when the system is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshMutatorOptions {
    pub shift_vertex: bool,
    pub flip_non_delaunay: bool,
    /// Only flip edges whose dihedral is below `flat_dihedral`
    pub flip_requires_flat: bool,
    pub split_long: bool,
    pub split_large: bool,
    pub split_curved: bool,
    pub collapse_short: bool,
    pub collapse_small: bool,
    pub collapse_requires_flat: bool,
    pub target_edge_length: f64,
    pub max_face_area: f64,
    pub min_face_area: f64,
    /// Split when edge length times max |H| of the endpoints exceeds this
    pub curvature_tolerance: f64,
    /// Dihedral angle (radians) below which an edge counts as flat
    pub flat_dihedral: f64,
    pub smoothing: SmoothingMode,
}

impl Default for MeshMutatorOptions {
    fn default() -> Self {
        Self {
            shift_vertex: false,
            flip_non_delaunay: false,
            flip_requires_flat: false,
            split_long: false,
            split_large: false,
            split_curved: false,
            collapse_short: false,
            collapse_small: false,
            collapse_requires_flat: false,
            target_edge_length: 0.0,
            max_face_area: 0.0,
            min_face_area: 0.0,
            curvature_tolerance: 0.5,
            flat_dihedral: 0.1,
            smoothing: SmoothingMode::None,
        }
    }
}

impl MeshMutatorOptions {
    /// Whether any enabled operation can change connectivity
    pub fn changes_topology(&self) -> bool {
        self.flip_non_delaunay
            || self.split_long
            || self.split_large
            || self.split_curved
            || self.collapse_short
            || self.collapse_small
    }

    pub fn is_enabled(&self) -> bool {
        self.shift_vertex || self.changes_topology() || self.smoothing != SmoothingMode::None
    }
}
