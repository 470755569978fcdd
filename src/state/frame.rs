//! Serializable snapshot of one saved frame.

use serde::{Deserialize, Serialize};

use super::Energy;

/// Everything a trajectory writer needs to persist one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame: usize,
    pub time: f64,
    pub energy: Energy,
    /// Euclidean norm of the masked mechanical force
    pub mechanical_norm: f64,
    /// Euclidean norm of the masked chemical potential
    pub chemical_norm: f64,
    pub surface_area: f64,
    pub volume: f64,
    pub positions: Vec<[f64; 3]>,
    pub velocities: Vec<[f64; 3]>,
    pub protein_density: Vec<f64>,
    pub faces: Vec<[usize; 3]>,
}
