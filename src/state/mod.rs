//! State carried by a membrane simulation.
//!
//! Vertex fields are the degrees of freedom; forces and energies are
//! derived from them and overwritten on every evaluation.

mod energy;
mod fields;
mod forces;
mod frame;

pub use energy::Energy;
pub use fields::VertexFields;
pub use forces::{BendingComponents, ChemicalPotential, Forces, NormalProjections};
pub use frame::FrameRecord;
