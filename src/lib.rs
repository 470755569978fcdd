//! Membrane Simulator X - triangulated membrane mechanics with protein coupling
//!
//! This library evolves a closed or open triangulated surface under Helfrich
//! bending, surface tension, osmotic pressure and protein-density coupling,
//! with optional DPD thermostat, mesh regularization and adaptive remeshing.

pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod physics;
pub mod state;

pub use config::{IntegratorOptions, MeshMutatorOptions, Parameters};
pub use error::{ConfigError, Result, SimulationError, TopologyError};
pub use geometry::{GeometrySnapshot, SurfaceMesh};
pub use physics::{IntegratorStatus, MembraneSystem, RunSummary, Stepper};
pub use state::{Energy, Forces, FrameRecord, VertexFields};
