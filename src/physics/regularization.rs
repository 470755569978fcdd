//! Mesh quality regularization.
//!
//! A tangential force that pulls edge lengths, face areas and the conformal
//! length cross ratio toward their reference values. It does not derive
//! from the membrane free energy and never moves vertices along the normal.

use glam::DVec3;

use super::system::length_cross_ratio;
use super::MembraneSystem;
use crate::geometry::halfedge_vector;

impl MembraneSystem {
    /// Fill `forces.regularization`; boundary vertices are left in place
    pub fn compute_regularization_force(&mut self) {
        let n = self.n_vertices();
        let mesh = &self.mesh;
        let positions = &self.fields.positions;
        let geometry = &self.geometry;
        let reg = &self.parameters.regularizer;
        let reference = &self.reference;
        let mut force = vec![DVec3::ZERO; n];

        if !reg.is_active() {
            self.forces.regularization = force;
            return;
        }

        for v in 0..n {
            if mesh.is_boundary_vertex(v) {
                continue;
            }
            for he in mesh.outgoing_halfedges(v) {
                let e = mesh.edge(he);

                if reg.kst != 0.0 {
                    if let Some(lcr) = length_cross_ratio(mesh, positions, e) {
                        let target = reference.cross_ratios[e];
                        let jl = mesh.next(he);
                        let li = mesh.next(jl);
                        let ik = mesh.next(mesh.twin(he));
                        let kj = mesh.next(ik);
                        let l_jl = geometry.edge_lengths[mesh.edge(jl)];
                        let l_li = geometry.edge_lengths[mesh.edge(li)];
                        let l_ik = geometry.edge_lengths[mesh.edge(ik)];
                        let l_kj = geometry.edge_lengths[mesh.edge(kj)];
                        let grad_li = halfedge_vector(mesh, positions, li).normalize_or_zero();
                        let grad_ik = -halfedge_vector(mesh, positions, ik).normalize_or_zero();
                        force[v] -= reg.kst * (lcr - target) / target * (l_kj / l_jl)
                            * (grad_li * l_ik - grad_ik * l_li)
                            / (l_ik * l_ik);
                    }
                }

                if reg.ksl != 0.0 {
                    if let Some(f) = mesh.face(he) {
                        let base = halfedge_vector(mesh, positions, mesh.next(he));
                        let area_gradient = geometry.face_normals[f].cross(base);
                        force[v] -= reg.ksl
                            * area_gradient
                            * (geometry.face_areas[f] - reference.mean_face_area);
                    }
                }

                if reg.kse != 0.0 {
                    let edge_gradient = -halfedge_vector(mesh, positions, he).normalize_or_zero();
                    force[v] -= reg.kse
                        * edge_gradient
                        * (geometry.edge_lengths[e] - reference.mean_edge_length);
                }
            }
        }

        for (f, normal) in force.iter_mut().zip(&geometry.vertex_normals) {
            *f -= f.dot(*normal) * *normal;
        }
        self.forces.regularization = force;
    }

    /// Apply the regularization force as a direct displacement
    pub fn apply_regularization(&mut self) {
        self.compute_regularization_force();
        for (x, f) in self
            .fields
            .positions
            .iter_mut()
            .zip(&self.forces.regularization)
        {
            *x += *f;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::geometry::primitives;

    fn regularized_sphere(kst: f64, ksl: f64, kse: f64) -> MembraneSystem {
        let mut params = Parameters::default();
        params.regularizer.kst = kst;
        params.regularizer.ksl = ksl;
        params.regularizer.kse = kse;
        let (faces, positions) = primitives::icosphere(1.0, 2);
        MembraneSystem::new(&faces, positions, params, None).unwrap()
    }

    #[test]
    fn test_reference_configuration_is_unforced_by_conformal_term() {
        let mut system = regularized_sphere(0.1, 0.0, 0.0);
        system.compute_regularization_force();
        for f in &system.forces.regularization {
            assert!(f.length() < 1e-12);
        }
    }

    #[test]
    fn test_regularization_is_tangential() {
        let mut system = regularized_sphere(0.1, 0.1, 0.1);
        // Shear one vertex sideways so every term is active
        system.fields.positions[5] += DVec3::new(0.05, -0.03, 0.02);
        system.update_configuration();
        system.compute_regularization_force();

        let mut any = false;
        for (f, n) in system
            .forces
            .regularization
            .iter()
            .zip(&system.geometry.vertex_normals)
        {
            assert!(f.dot(*n).abs() < 1e-12);
            any |= f.length() > 0.0;
        }
        assert!(any);
    }

    #[test]
    fn test_edge_term_restores_perturbed_vertex() {
        let mut system = regularized_sphere(0.0, 0.0, 0.5);
        let original = system.fields.positions[7];
        let normal = system.geometry.vertex_normals[7];
        let tangent = normal.any_orthonormal_vector();
        system.fields.positions[7] += 0.05 * tangent;
        system.update_configuration();
        system.compute_regularization_force();
        // The corrective force points back toward the original position
        let back = original - system.fields.positions[7];
        assert!(system.forces.regularization[7].dot(back) > 0.0);
    }
}
