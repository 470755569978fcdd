//! Membrane system: mesh, geometry, fields and derived forces.
//!
//! `MembraneSystem` owns everything a step needs. Geometry is rebuilt from
//! scratch by `update_configuration` after any change to positions or
//! protein density; nothing is patched in place.

use glam::DVec3;

use crate::config::{
    OsmoticPolicy, Parameters, ProteinBoundaryCondition, ProteinDistribution,
    ShapeBoundaryCondition,
};
use crate::error::{ConfigError, Result, TopologyError};
use crate::geometry::{geodesic, GeometrySnapshot, SurfaceMesh};
use crate::state::{Energy, Forces, FrameRecord, VertexFields};

/// Reference quantities captured from the initial configuration
#[derive(Debug, Clone)]
pub struct ReferenceGeometry {
    /// Preferred total area A_t
    pub target_area: f64,
    /// Volume that `Vt` is relative to
    pub reference_volume: f64,
    pub mean_edge_length: f64,
    pub mean_face_area: f64,
    /// Per-edge length cross ratio, used by conformal regularization
    pub cross_ratios: Vec<f64>,
}

/// Triangulated membrane with its fields, forces and energy
#[derive(Debug, Clone)]
pub struct MembraneSystem {
    pub mesh: SurfaceMesh,
    pub geometry: GeometrySnapshot,
    pub fields: VertexFields,
    /// Edits to `bending` take effect only after `update_configuration`,
    /// which rebuilds the per-vertex moduli and spontaneous curvature
    pub parameters: Parameters,
    pub forces: Forces,
    pub energy: Energy,
    pub reference: ReferenceGeometry,
    /// Simulation time
    pub time: f64,
}

impl MembraneSystem {
    /// Build a system from a triangulation.
    ///
    /// `initial_density` overrides the configured protein distribution.
    pub fn new(
        faces: &[[usize; 3]],
        positions: Vec<DVec3>,
        parameters: Parameters,
        initial_density: Option<Vec<f64>>,
    ) -> Result<Self> {
        parameters.validate()?;
        if positions.is_empty() {
            return Err(TopologyError::Empty.into());
        }
        let mesh = SurfaceMesh::from_faces(positions.len(), faces)?;
        let geometry = GeometrySnapshot::compute(&mesh, &positions);
        let n = mesh.n_vertices();

        let reference = ReferenceGeometry::capture(&mesh, &positions, &geometry, &parameters)?;

        let mut system = Self {
            forces: Forces::new(n),
            fields: VertexFields::new(positions, vec![0.5; n]),
            mesh,
            geometry,
            parameters,
            energy: Energy::default(),
            reference,
            time: 0.0,
        };

        system.locate_tracked_point();
        system.update_geodesics();

        match initial_density {
            Some(density) => {
                if density.len() != n {
                    return Err(ConfigError::LengthMismatch {
                        name: "initial protein density",
                        expected: n,
                        actual: density.len(),
                    }
                    .into());
                }
                if let Some(&bad) = density.iter().find(|&&phi| !(phi > 0.0 && phi < 1.0)) {
                    return Err(ConfigError::OutOfRange {
                        name: "initial protein density",
                        requirement: "in the open interval (0, 1)",
                        value: bad,
                    }
                    .into());
                }
                system.fields.protein_density = density;
            }
            None => system.apply_initial_distribution(),
        }

        system.update_configuration();
        log::info!(
            "Membrane system: {} vertices, {} faces, area {:.4}, volume {:.4}",
            system.mesh.n_vertices(),
            system.mesh.n_faces(),
            system.geometry.surface_area,
            system.geometry.volume
        );
        Ok(system)
    }

    pub fn n_vertices(&self) -> usize {
        self.mesh.n_vertices()
    }

    /// Rebuild geometry and density-dependent material fields
    pub fn update_configuration(&mut self) {
        self.geometry = GeometrySnapshot::compute(&self.mesh, &self.fields.positions);

        let bending = &self.parameters.bending;
        for v in 0..self.fields.n_vertices() {
            let (profile, _) = bending.relation.profile(self.fields.protein_density[v]);
            self.fields.spontaneous_curvature[v] = bending.h0c * profile;
            self.fields.bending_modulus[v] = bending.kb + bending.kbc * profile;
        }
    }

    /// Mark the vertex nearest the configured point as tracked
    pub fn locate_tracked_point(&mut self) {
        let point = &self.parameters.point;
        let target = DVec3::from_array(point.position);
        self.fields.tracked.iter_mut().for_each(|t| *t = false);
        if let Some(v) = geodesic::closest_vertex(&self.fields.positions, target, point.planar) {
            self.fields.tracked[v] = true;
        }
    }

    /// Recompute geodesic distances from the tracked point and the masks
    /// that depend on them
    pub fn update_geodesics(&mut self) {
        if self.parameters.point.is_floating {
            self.locate_tracked_point();
        }
        if let Some(source) = self.fields.tracked_point() {
            self.fields.geodesic_distance = geodesic::distances(&self.mesh, &self.geometry, source);
        }
        self.update_masks();
    }

    /// Rebuild force and protein masks from boundary conditions, the
    /// geodesic mask and the variation flags
    pub fn update_masks(&mut self) {
        let n = self.mesh.n_vertices();
        let shape_bc = self.parameters.boundary.shape;
        let constrained = DVec3::from_array(shape_bc.mask());

        let mut force_mask = vec![DVec3::ONE; n];
        let mut protein_mask = vec![1.0; n];
        for v in 0..n {
            if !self.mesh.is_boundary_vertex(v) {
                continue;
            }
            force_mask[v] = constrained;
            if shape_bc == ShapeBoundaryCondition::Fixed {
                for u in self.mesh.neighbors(v) {
                    force_mask[u] = DVec3::ZERO;
                }
            }
            if self.parameters.protein.boundary == ProteinBoundaryCondition::Pin {
                protein_mask[v] = 0.0;
            }
        }

        let radius = self.parameters.variation.geodesic_mask;
        if radius > 0.0 {
            for v in 0..n {
                if self.fields.geodesic_distance[v] > radius {
                    force_mask[v] = DVec3::ZERO;
                    protein_mask[v] = 0.0;
                }
            }
        }

        if !self.parameters.variation.shape {
            force_mask.iter_mut().for_each(|m| *m = DVec3::ZERO);
        }
        if !self.parameters.variation.protein {
            protein_mask.iter_mut().for_each(|m| *m = 0.0);
        }

        self.fields.force_mask = force_mask;
        self.fields.protein_mask = protein_mask;
    }

    fn apply_initial_distribution(&mut self) {
        match self.parameters.protein.initial {
            ProteinDistribution::Uniform(phi) => {
                self.fields.protein_density.iter_mut().for_each(|p| *p = phi);
            }
            ProteinDistribution::Disk {
                radius,
                inside,
                outside,
                sharpness,
            } => {
                for (phi, &d) in self
                    .fields
                    .protein_density
                    .iter_mut()
                    .zip(&self.fields.geodesic_distance)
                {
                    let step = 0.5 * (1.0 + (sharpness * (radius - d)).tanh());
                    *phi = outside + (inside - outside) * step;
                }
            }
        }
    }

    /// Serializable record of the current state
    pub fn frame_record(&self, frame: usize, mechanical_norm: f64, chemical_norm: f64) -> FrameRecord {
        FrameRecord {
            frame,
            time: self.time,
            energy: self.energy,
            mechanical_norm,
            chemical_norm,
            surface_area: self.geometry.surface_area,
            volume: self.geometry.volume,
            positions: self.fields.positions.iter().map(|p| p.to_array()).collect(),
            velocities: self.fields.velocities.iter().map(|v| v.to_array()).collect(),
            protein_density: self.fields.protein_density.clone(),
            faces: self.mesh.faces().to_vec(),
        }
    }
}

impl ReferenceGeometry {
    fn capture(
        mesh: &SurfaceMesh,
        positions: &[DVec3],
        geometry: &GeometrySnapshot,
        parameters: &Parameters,
    ) -> std::result::Result<Self, ConfigError> {
        let target_area = parameters
            .tension
            .target_area
            .unwrap_or(geometry.surface_area);
        if !(target_area > 0.0) {
            return Err(ConfigError::DegenerateReference("surface area"));
        }

        let reference_volume = parameters
            .osmotic
            .reference_volume
            .unwrap_or(geometry.volume);
        let needs_volume = parameters.osmotic.kv != 0.0
            && parameters.osmotic.policy != OsmoticPolicy::ConstantPressure;
        if needs_volume && mesh.has_boundary() {
            return Err(ConfigError::Incompatible(
                "volume-based osmotic pressure requires a closed surface".to_string(),
            ));
        }
        if needs_volume && !(reference_volume > 0.0) {
            return Err(ConfigError::DegenerateReference("volume"));
        }

        let regularizer = &parameters.regularizer;
        let mean_edge_length = geometry.mean_edge_length();
        let mean_face_area = geometry.mean_face_area();
        if regularizer.kse != 0.0 && !(mean_edge_length > 0.0) {
            return Err(ConfigError::DegenerateReference("edge length"));
        }
        if regularizer.ksl != 0.0 && !(mean_face_area > 0.0) {
            return Err(ConfigError::DegenerateReference("face area"));
        }

        let cross_ratios: Vec<f64> = (0..mesh.n_edges())
            .map(|e| length_cross_ratio(mesh, positions, e).unwrap_or(0.0))
            .collect();
        if regularizer.kst != 0.0 {
            let degenerate = (0..mesh.n_edges())
                .any(|e| !mesh.is_boundary_edge(e) && !(cross_ratios[e] > 0.0 && cross_ratios[e].is_finite()));
            if degenerate {
                return Err(ConfigError::DegenerateReference("length cross ratio"));
            }
        }

        Ok(Self {
            target_area,
            reference_volume,
            mean_edge_length,
            mean_face_area,
            cross_ratios,
        })
    }
}

/// Length cross ratio l_li·l_kj / (l_ik·l_jl) of the quad around an interior
/// edge i→j with opposite vertices l (left) and k (right)
pub fn length_cross_ratio(mesh: &SurfaceMesh, positions: &[DVec3], e: usize) -> Option<f64> {
    if mesh.is_boundary_edge(e) {
        return None;
    }
    let he = mesh.edge_halfedge(e);
    let jl = mesh.next(he);
    let li = mesh.next(jl);
    let ik = mesh.next(mesh.twin(he));
    let kj = mesh.next(ik);
    let length = |h: usize| (positions[mesh.tip(h)] - positions[mesh.tail(h)]).length();
    Some(length(li) * length(kj) / (length(ik) * length(jl)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShapeBoundaryCondition;
    use crate::geometry::primitives;

    #[test]
    fn test_system_creation() {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        let system = MembraneSystem::new(&faces, positions, Parameters::default(), None).unwrap();
        assert_eq!(system.n_vertices(), 42);
        assert_eq!(system.fields.tracked_count(), 1);
        assert!((system.reference.target_area - system.geometry.surface_area).abs() < 1e-12);
        for &phi in &system.fields.protein_density {
            assert_eq!(phi, 0.1);
        }
    }

    #[test]
    fn test_rejects_volume_policy_on_patch() {
        let (faces, positions) = primitives::hexagon(1.0, 1);
        let result = MembraneSystem::new(&faces, positions, Parameters::default(), None);
        assert!(matches!(
            result,
            Err(crate::SimulationError::Config(ConfigError::Incompatible(_)))
        ));
    }

    #[test]
    fn test_rejects_density_length_mismatch() {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        let result = MembraneSystem::new(&faces, positions, Parameters::default(), Some(vec![0.5; 3]));
        assert!(matches!(
            result,
            Err(crate::SimulationError::Config(ConfigError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_rejects_zero_area_reference() {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        let collapsed = vec![DVec3::ZERO; positions.len()];
        let result = MembraneSystem::new(&faces, collapsed, Parameters::default(), None);
        assert!(matches!(
            result,
            Err(crate::SimulationError::Config(ConfigError::DegenerateReference("surface area")))
        ));
    }

    #[test]
    fn test_rejects_zero_edge_length_reference() {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        let collapsed = vec![DVec3::ZERO; positions.len()];
        let mut params = Parameters::default();
        params.tension.target_area = Some(1.0);
        params.osmotic.kv = 0.0;
        params.regularizer.kse = 0.1;
        let result = MembraneSystem::new(&faces, collapsed, params, None);
        assert!(matches!(
            result,
            Err(crate::SimulationError::Config(ConfigError::DegenerateReference("edge length")))
        ));
    }

    #[test]
    fn test_boundary_masks() {
        let (faces, positions) = primitives::hexagon(1.0, 2);
        let mut params = Parameters::default();
        params.osmotic.policy = OsmoticPolicy::ConstantPressure;
        params.boundary.shape = ShapeBoundaryCondition::Roller;
        let system = MembraneSystem::new(&faces, positions, params, None).unwrap();
        for v in 0..system.n_vertices() {
            let expected = if system.mesh.is_boundary_vertex(v) {
                DVec3::new(1.0, 1.0, 0.0)
            } else {
                DVec3::ONE
            };
            assert_eq!(system.fields.force_mask[v], expected);
        }
    }

    #[test]
    fn test_disk_distribution_is_localized() {
        let (faces, positions) = primitives::icosphere(1.0, 2);
        let mut params = Parameters::default();
        params.protein.initial = ProteinDistribution::Disk {
            radius: 0.5,
            inside: 0.9,
            outside: 0.1,
            sharpness: 20.0,
        };
        let system = MembraneSystem::new(&faces, positions, params, None).unwrap();
        let tracked = system.fields.tracked_point().unwrap();
        assert!(system.fields.protein_density[tracked] > 0.85);
        let far = system
            .fields
            .geodesic_distance
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(v, _)| v)
            .unwrap();
        assert!(system.fields.protein_density[far] < 0.15);
    }

    #[test]
    fn test_cross_ratio_of_regular_quad() {
        let (faces, positions) = primitives::hexagon(1.0, 0);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        // Spokes of a regular hexagon bound two equilateral triangles
        let e = (0..mesh.n_edges()).find(|&e| !mesh.is_boundary_edge(e)).unwrap();
        let ratio = length_cross_ratio(&mesh, &positions, e).unwrap();
        assert!((ratio - 1.0).abs() < 1e-12);
    }
}
