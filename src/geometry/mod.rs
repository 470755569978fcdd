//! Triangulated surface representation and discrete differential geometry.
//!
//! `SurfaceMesh` is immutable connectivity, `GeometrySnapshot` is derived
//! from it plus positions, and `MeshEditor` performs topology changes that
//! end in a fresh `SurfaceMesh`.

mod editor;
mod mesh;
mod snapshot;

pub mod geodesic;
pub mod primitives;

pub use editor::{Compressed, MeshEditor, VertexKey};
pub use mesh::{Outgoing, SurfaceMesh};
pub use snapshot::{halfedge_vector, GeometrySnapshot};
