//! Discrete differential geometry of a mesh configuration.
//!
//! A `GeometrySnapshot` is a pure function of connectivity and vertex
//! positions. It is never patched: callers build a fresh snapshot after
//! every position or topology change.
//!
//! Conventions:
//! - `vec(he) = x[tip] - x[tail]`
//! - halfedge cotan weight = ½ cot(angle opposite the halfedge), 0 if exterior
//! - dihedral angle is positive on convex surfaces and 0 on boundary edges
//! - integrated mean curvature M_v = ¼ Σ l_e θ_e over edges at v
//! - integrated Gaussian curvature is the angle defect (π on the boundary)
//!
//! Reference: Crane et al., "Discrete Differential Geometry: An Applied
//! Introduction", 2013

use std::f64::consts::PI;

use glam::DVec3;

use super::SurfaceMesh;

/// Geometric quantities of one configuration, indexed by mesh element
#[derive(Debug, Clone)]
pub struct GeometrySnapshot {
    pub face_areas: Vec<f64>,
    /// Unit normals following the face winding
    pub face_normals: Vec<DVec3>,
    pub edge_lengths: Vec<f64>,
    pub halfedge_cotan_weights: Vec<f64>,
    /// Sum of the two halfedge cotan weights
    pub edge_cotan_weights: Vec<f64>,
    pub edge_dihedral_angles: Vec<f64>,
    /// Interior angle at the tail of each halfedge, 0 if exterior
    pub corner_angles: Vec<f64>,
    /// Barycentric dual area (one third of incident face areas)
    pub vertex_dual_areas: Vec<f64>,
    /// Integrated mean curvature
    pub vertex_mean_curvatures: Vec<f64>,
    /// Integrated Gaussian curvature (angle defect)
    pub vertex_gaussian_curvatures: Vec<f64>,
    /// Angle-weighted unit normals
    pub vertex_normals: Vec<DVec3>,
    pub surface_area: f64,
    /// Signed enclosed volume (relative to the origin for open meshes)
    pub volume: f64,
}

/// Edge vector of a halfedge
pub fn halfedge_vector(mesh: &SurfaceMesh, positions: &[DVec3], he: usize) -> DVec3 {
    positions[mesh.tip(he)] - positions[mesh.tail(he)]
}

impl GeometrySnapshot {
    pub fn compute(mesh: &SurfaceMesh, positions: &[DVec3]) -> Self {
        let n_faces = mesh.n_faces();
        let n_edges = mesh.n_edges();
        let n_halfedges = mesh.n_halfedges();
        let n_vertices = mesh.n_vertices();

        let mut face_areas = Vec::with_capacity(n_faces);
        let mut face_normals = Vec::with_capacity(n_faces);
        let mut volume = 0.0;
        for face in mesh.faces() {
            let [a, b, c] = face.map(|v| positions[v]);
            let n = (b - a).cross(c - a);
            face_areas.push(0.5 * n.length());
            face_normals.push(n.normalize_or_zero());
            volume += a.dot(b.cross(c)) / 6.0;
        }
        let surface_area = face_areas.iter().sum();

        let edge_lengths: Vec<f64> = (0..n_edges)
            .map(|e| halfedge_vector(mesh, positions, mesh.edge_halfedge(e)).length())
            .collect();

        let mut halfedge_cotan_weights = vec![0.0; n_halfedges];
        let mut corner_angles = vec![0.0; n_halfedges];
        for he in 0..n_halfedges {
            if !mesh.is_interior(he) {
                continue;
            }
            let tail = positions[mesh.tail(he)];
            let tip = positions[mesh.tip(he)];
            let opposite = positions[mesh.tail(mesh.next(mesh.next(he)))];

            let u = tail - opposite;
            let w = tip - opposite;
            let cross = u.cross(w).length();
            halfedge_cotan_weights[he] = if cross > 0.0 {
                0.5 * u.dot(w) / cross
            } else {
                0.0
            };

            let a = tip - tail;
            let b = opposite - tail;
            corner_angles[he] = a.cross(b).length().atan2(a.dot(b));
        }

        let edge_cotan_weights = (0..n_edges)
            .map(|e| {
                let he = mesh.edge_halfedge(e);
                halfedge_cotan_weights[he] + halfedge_cotan_weights[mesh.twin(he)]
            })
            .collect();

        let edge_dihedral_angles: Vec<f64> = (0..n_edges)
            .map(|e| {
                let he = mesh.edge_halfedge(e);
                let twin = mesh.twin(he);
                match (mesh.face(he), mesh.face(twin)) {
                    (Some(f1), Some(f2)) => {
                        let n1 = face_normals[f1];
                        let n2 = face_normals[f2];
                        let dir = halfedge_vector(mesh, positions, he).normalize_or_zero();
                        dir.dot(n1.cross(n2)).atan2(n1.dot(n2))
                    }
                    _ => 0.0,
                }
            })
            .collect();

        let mut vertex_dual_areas = vec![0.0; n_vertices];
        let mut vertex_mean_curvatures = vec![0.0; n_vertices];
        let mut vertex_gaussian_curvatures = vec![0.0; n_vertices];
        let mut vertex_normals = vec![DVec3::ZERO; n_vertices];
        for v in 0..n_vertices {
            let mut angle_sum = 0.0;
            let mut normal = DVec3::ZERO;
            for he in mesh.outgoing_halfedges(v) {
                let e = mesh.edge(he);
                vertex_mean_curvatures[v] += 0.25 * edge_lengths[e] * edge_dihedral_angles[e];
                if let Some(f) = mesh.face(he) {
                    vertex_dual_areas[v] += face_areas[f] / 3.0;
                    angle_sum += corner_angles[he];
                    normal += corner_angles[he] * face_normals[f];
                }
            }
            let full = if mesh.is_boundary_vertex(v) { PI } else { 2.0 * PI };
            vertex_gaussian_curvatures[v] = full - angle_sum;
            vertex_normals[v] = normal.normalize_or_zero();
        }

        Self {
            face_areas,
            face_normals,
            edge_lengths,
            halfedge_cotan_weights,
            edge_cotan_weights,
            edge_dihedral_angles,
            corner_angles,
            vertex_dual_areas,
            vertex_mean_curvatures,
            vertex_gaussian_curvatures,
            vertex_normals,
            surface_area,
            volume,
        }
    }

    /// Pointwise mean curvature H = M / A
    pub fn mean_curvature(&self, v: usize) -> f64 {
        self.vertex_mean_curvatures[v] / self.vertex_dual_areas[v]
    }

    pub fn min_edge_length(&self) -> f64 {
        self.edge_lengths.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn mean_edge_length(&self) -> f64 {
        self.edge_lengths.iter().sum::<f64>() / self.edge_lengths.len() as f64
    }

    pub fn mean_face_area(&self) -> f64 {
        self.surface_area / self.face_areas.len() as f64
    }

    /// Gradient of the piecewise-linear interpolant of `values` on face `f`
    pub fn face_gradient(
        &self,
        mesh: &SurfaceMesh,
        positions: &[DVec3],
        f: usize,
        values: &[f64],
    ) -> DVec3 {
        let area = self.face_areas[f];
        if area <= 0.0 {
            return DVec3::ZERO;
        }
        let normal = self.face_normals[f];
        let he0 = mesh.face_halfedge(f);
        let mut gradient = DVec3::ZERO;
        let mut he = he0;
        loop {
            // Vertex opposite to the edge of `he`
            let opposite = mesh.tail(mesh.next(mesh.next(he)));
            gradient += values[opposite] * normal.cross(halfedge_vector(mesh, positions, he));
            he = mesh.next(he);
            if he == he0 {
                break;
            }
        }
        gradient / (2.0 * area)
    }

    /// Apply the cotan Laplacian, (Lq)_i = Σ_j w_ij (q_i - q_j)
    pub fn cotan_laplacian(&self, mesh: &SurfaceMesh, values: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; values.len()];
        for (e, &w) in self.edge_cotan_weights.iter().enumerate() {
            let (a, b) = mesh.edge_vertices(e);
            let diff = w * (values[a] - values[b]);
            result[a] += diff;
            result[b] -= diff;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::primitives;

    #[test]
    fn test_icosphere_area_and_volume() {
        let (faces, positions) = primitives::icosphere(1.0, 3);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let geo = GeometrySnapshot::compute(&mesh, &positions);

        assert!(
            (geo.surface_area - 4.0 * PI).abs() / (4.0 * PI) < 0.03,
            "Area {} should approach 4π",
            geo.surface_area
        );
        assert!(
            (geo.volume - 4.0 / 3.0 * PI).abs() / (4.0 / 3.0 * PI) < 0.05,
            "Volume {} should approach 4π/3",
            geo.volume
        );
    }

    #[test]
    fn test_sphere_curvatures() {
        let (faces, positions) = primitives::icosphere(2.0, 2);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let geo = GeometrySnapshot::compute(&mesh, &positions);

        // Gauss-Bonnet: Σ K = 2πχ
        let total_k: f64 = geo.vertex_gaussian_curvatures.iter().sum();
        assert!((total_k - 4.0 * PI).abs() < 1e-9, "Total K = {}", total_k);

        // Barycentric dual areas undersize the twelve valence-5 vertices
        let mut weighted = 0.0;
        for v in 0..mesh.n_vertices() {
            let h = geo.mean_curvature(v);
            weighted += h * geo.vertex_dual_areas[v];
            if mesh.valence(v) == 6 {
                assert!((h - 0.5).abs() < 0.1, "H at {} is {}, expected ~0.5", v, h);
            }
            let radial = positions[v].normalize();
            assert!(geo.vertex_normals[v].dot(radial) > 0.99);
        }
        let mean = weighted / geo.surface_area;
        assert!((mean - 0.5).abs() < 0.05, "Mean H is {}", mean);
        for &theta in &geo.edge_dihedral_angles {
            assert!(theta > 0.0, "Convex surface must have positive dihedrals");
        }
    }

    #[test]
    fn test_flat_patch_has_zero_curvature() {
        let (faces, positions) = primitives::hexagon(1.0, 2);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let geo = GeometrySnapshot::compute(&mesh, &positions);
        for v in 0..mesh.n_vertices() {
            assert!(geo.vertex_mean_curvatures[v].abs() < 1e-12);
            if !mesh.is_boundary_vertex(v) {
                assert!(geo.vertex_gaussian_curvatures[v].abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_linear_field_gradient_and_laplacian() {
        let (faces, positions) = primitives::hexagon(1.0, 2);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let geo = GeometrySnapshot::compute(&mesh, &positions);
        let values: Vec<f64> = positions.iter().map(|p| 2.0 * p.x - p.y).collect();

        for f in 0..mesh.n_faces() {
            let g = geo.face_gradient(&mesh, &positions, f, &values);
            assert!((g - DVec3::new(2.0, -1.0, 0.0)).length() < 1e-9);
        }

        // Linear functions are harmonic at interior vertices
        let lap = geo.cotan_laplacian(&mesh, &values);
        for v in 0..mesh.n_vertices() {
            if !mesh.is_boundary_vertex(v) {
                assert!(lap[v].abs() < 1e-9, "Laplacian {} at {}", lap[v], v);
            }
        }
    }
}
