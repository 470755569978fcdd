//! Configuration for membrane physics and numerics.
//!
//! Physical moduli live in `Parameters`; step control and remeshing live in
//! `IntegratorOptions` and `MeshMutatorOptions`.

mod options;
mod parameters;

pub use options::{
    ConstraintPolicy, IntegrationScheme, IntegratorOptions, MeshMutatorOptions, SmoothingMode,
};
pub use parameters::{
    AdsorptionParameters, AggregationParameters, BendingParameters, BendingRelation,
    BoundaryParameters, DirichletParameters, DpdParameters, ExternalParameters,
    OsmoticParameters, OsmoticPolicy, Parameters, PointParameters, ProteinBoundaryCondition,
    ProteinDistribution, ProteinParameters, RegularizerParameters, ShapeBoundaryCondition,
    TensionParameters, VariationParameters,
};
