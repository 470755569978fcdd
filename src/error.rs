//! Error types for the membrane simulator.
//!
//! Configuration errors fail fast at setup, topology errors abort a mesh
//! mutation. Numerical divergence is not an error here: the integrator
//! detects it after the fact and reports a `Failed` status instead.

use thiserror::Error;

/// Unified error type for simulation setup and mesh processing.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Invalid parameter or option combination
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Mesh connectivity or tracked-point invariant violated
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// I/O errors (parameter files, exports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure inside a frame sink
    #[error(transparent)]
    Export(#[from] anyhow::Error),
}

/// Invalid parameter combinations, detected before any step is taken.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {requirement}, got {value}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("field '{name}' has length {actual}, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("reference {0} is zero, regularization target is degenerate")]
    DegenerateReference(&'static str),

    #[error("{scheme} does not support {feature}")]
    UnsupportedByScheme {
        scheme: &'static str,
        feature: &'static str,
    },

    #[error("{0}")]
    Incompatible(String),
}

/// Mesh invariants that must hold for the simulation to continue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("face {face} references vertex {vertex}, mesh has {n_vertices} vertices")]
    VertexOutOfRange {
        face: usize,
        vertex: usize,
        n_vertices: usize,
    },

    #[error("face {0} is degenerate (repeated vertex)")]
    DegenerateFace(usize),

    #[error("edge ({0}, {1}) is non-manifold or inconsistently oriented")]
    NonManifoldEdge(usize, usize),

    #[error("vertex {0} is non-manifold")]
    NonManifoldVertex(usize),

    #[error("vertex {0} is not referenced by any face")]
    IsolatedVertex(usize),

    #[error("boundary vertex {vertex} has {count} boundary neighbors, expected 2")]
    BoundaryNeighbors { vertex: usize, count: usize },

    #[error("expected exactly one tracked point, found {0}")]
    TrackedPoint(usize),

    #[error("vertex key {index} (generation {generation}) is stale")]
    StaleVertex { index: usize, generation: u32 },

    #[error("mesh is empty")]
    Empty,
}

pub type Result<T> = std::result::Result<T, SimulationError>;
