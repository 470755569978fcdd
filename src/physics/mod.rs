//! Membrane mechanics and protein transport.
//!
//! This module implements:
//! - Helfrich bending, capillary, osmotic and protein-coupled forces
//! - Their energies and the protein chemical potential
//! - DPD thermostat on mesh edges
//! - Tangential mesh regularization and topology mutation
//! - Time integration (Euler, velocity Verlet, conjugate gradient)
//!
//! References:
//! - Zhu C, Lee CT, Rangamani P. "Mem3DG", Biophys Rep 2022
//! - DPD: Groot & Warren, J Chem Phys 1997

pub mod dpd;
mod energy;
mod forces;
pub mod integrator;
mod mutation;
mod regularization;
mod system;

pub use integrator::{
    ConjugateGradient, Euler, FailureReason, Integrator, IntegratorStatus, LineSearchOutcome,
    RunSummary, Stepper, VelocityVerlet,
};
pub use system::{length_cross_ratio, MembraneSystem, ReferenceGeometry};
