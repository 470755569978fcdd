//! Conservative forces and chemical potential.
//!
//! Every force is the exact negative gradient of its energy term in
//! `energy.rs`, accumulated per vertex over outgoing halfedges so that each
//! halfedge contributes its share of the two adjacent faces.
//!
//! Bending uses the Helfrich energy Σ Kb A (H − H0)² with H = M/A and the
//! integrated mean curvature M = ¼ Σ l θ. Its gradient splits into a
//! Schläfli vector part (∇θ), an area gradient part (∇A) and a Gaussian
//! curvature vector part (∇l).
//!
//! Reference: Zhu C, Lee CT, Rangamani P. Biophys Rep 2022, appendix B

use glam::DVec3;
use rand::Rng;

use super::{dpd, MembraneSystem};
use crate::config::OsmoticPolicy;
use crate::geometry::{halfedge_vector, GeometrySnapshot, SurfaceMesh};

/// Normalized Gaussian density with zero mean
fn gaussian(x: f64, standard_deviation: f64) -> f64 {
    let s = standard_deviation;
    (-x * x / (2.0 * s * s)).exp() / (s * (2.0 * std::f64::consts::PI).sqrt())
}

/// Angle between two vectors, in [0, π]
pub(super) fn angle(a: DVec3, b: DVec3) -> f64 {
    a.cross(b).length().atan2(a.dot(b))
}

/// Per-halfedge geometric vectors at the tail vertex
struct HalfedgeVectors {
    /// Share of ∇A from the two faces adjacent to the edge
    area_gradient: DVec3,
    /// Share of ∇V from the face of the halfedge
    volume_gradient: DVec3,
    /// ½ θ ∇l
    gauss_vector: DVec3,
    /// Schläfli vector seen from the tail
    schlafli_tail: DVec3,
    /// Schläfli vector seen from the tip
    schlafli_tip: DVec3,
}

fn halfedge_vectors(
    mesh: &SurfaceMesh,
    positions: &[DVec3],
    geometry: &GeometrySnapshot,
    he: usize,
) -> HalfedgeVectors {
    let c = &geometry.halfedge_cotan_weights;
    let twin = mesh.twin(he);
    let next = mesh.next(he);
    let next_next = mesh.next(next);
    let twin_next = mesh.next(twin);
    let twin_next_next = mesh.next(twin_next);
    let face = mesh.face(he);
    let twin_face = mesh.face(twin);
    let normal = face.map_or(DVec3::ZERO, |f| geometry.face_normals[f]);
    let twin_normal = twin_face.map_or(DVec3::ZERO, |f| geometry.face_normals[f]);
    let edge = mesh.edge(he);
    let boundary_edge = mesh.is_boundary_edge(edge);

    let mut area_gradient = DVec3::ZERO;
    let mut volume_gradient = DVec3::ZERO;
    if let Some(f) = face {
        area_gradient += normal.cross(halfedge_vector(mesh, positions, next));
        volume_gradient = normal * geometry.face_areas[f] / 3.0;
    }
    if twin_face.is_some() {
        area_gradient += twin_normal.cross(halfedge_vector(mesh, positions, twin_next_next));
    }
    area_gradient *= 0.25;

    let mut gauss_vector = DVec3::ZERO;
    let mut schlafli_tail = DVec3::ZERO;
    if !boundary_edge {
        gauss_vector = 0.5
            * geometry.edge_dihedral_angles[edge]
            * (-halfedge_vector(mesh, positions, he)).normalize_or_zero();
        schlafli_tail = c[next_next] * normal + c[twin_next] * twin_normal;
    }

    let tail_boundary = mesh.is_boundary_vertex(mesh.tail(he));
    let tip_boundary = mesh.is_boundary_vertex(mesh.tip(he));
    let schlafli_tip = if tail_boundary && boundary_edge {
        if face.is_some() {
            -(c[he] + c[next_next]) * normal
        } else {
            -(c[twin] + c[twin_next]) * twin_normal
        }
    } else if !tail_boundary && tip_boundary {
        let mut v = schlafli_tail;
        if !mesh.is_boundary_edge(mesh.edge(next)) {
            v -= (c[he] + c[next_next]) * normal;
        }
        if !mesh.is_boundary_edge(mesh.edge(twin_next_next)) {
            v -= (c[twin] + c[twin_next]) * twin_normal;
        }
        v
    } else {
        -(c[he] * normal + c[twin] * twin_normal)
    };

    HalfedgeVectors {
        area_gradient,
        volume_gradient,
        gauss_vector,
        schlafli_tail,
        schlafli_tip,
    }
}

/// Gradient at the tail of `he` of |Σ φ_opp N × e|² over the face of `he`
fn grad_norm2_gradient(
    mesh: &SurfaceMesh,
    positions: &[DVec3],
    normal: DVec3,
    he: usize,
    values: &[f64],
) -> DVec3 {
    let next = mesh.next(he);
    let next_next = mesh.next(next);
    let qi = values[mesh.tail(he)];
    let qk = values[mesh.tail(next)];
    let qj = values[mesh.tail(next_next)];
    if qi == qj && qj == qk {
        return DVec3::ZERO;
    }

    let ej = halfedge_vector(mesh, positions, he);
    let ei = halfedge_vector(mesh, positions, next);
    let ek = halfedge_vector(mesh, positions, next_next);
    let (lj, li, lk) = (ej.length(), ei.length(), ek.length());

    let angle_k = angle(ej, ei);
    let angle_j = angle(ei, ek);
    let angle_i = angle(ek, ej);

    let grad_lj = -ej.normalize_or_zero();
    let grad_lk = ek.normalize_or_zero();

    let grad_angle_k = normal.cross(ej).normalize_or_zero() / lj;
    let grad_angle_j = normal.cross(ek).normalize_or_zero() / lk;
    let grad_angle_i = -(grad_angle_k + grad_angle_j);

    let grad_cos_k = -angle_k.sin() * grad_angle_k;
    let grad_cos_j = -angle_j.sin() * grad_angle_j;
    let grad_cos_i = -angle_i.sin() * grad_angle_i;

    2.0 * qj * qj * lj * grad_lj
        + 2.0 * qk * qk * lk * grad_lk
        + 2.0 * qj * qi * li * (grad_lj * angle_k.cos() + lj * grad_cos_k)
        + 2.0 * qi * qk * li * (grad_lk * angle_j.cos() + lk * grad_cos_j)
        + 2.0
            * qj
            * qk
            * (grad_lj * lk * angle_i.cos() + lj * grad_lk * angle_i.cos() + lj * lk * grad_cos_i)
}

impl MembraneSystem {
    /// Surface tension γ for the capillary force and surface energy
    pub fn surface_tension(&self) -> f64 {
        let tension = &self.parameters.tension;
        if tension.is_constant || self.mesh.has_boundary() {
            tension.ksg
        } else {
            let at = self.reference.target_area;
            tension.ksg * (self.geometry.surface_area - at) / at + tension.lambda_sg
        }
    }

    /// Preferred enclosed volume V̄
    pub fn preferred_volume(&self) -> f64 {
        self.reference.reference_volume * self.parameters.osmotic.vt
    }

    /// Osmotic pressure P for the osmotic force
    pub fn osmotic_pressure(&self) -> f64 {
        let osmotic = &self.parameters.osmotic;
        let volume = self.geometry.volume;
        match osmotic.policy {
            OsmoticPolicy::ConstantPressure => osmotic.kv,
            OsmoticPolicy::PreferredVolume => {
                let target = self.preferred_volume();
                -(osmotic.kv * (volume - target) / target + osmotic.lambda_v)
            }
            OsmoticPolicy::IdealGas => osmotic.kv * (osmotic.n / volume - osmotic.c_am),
        }
    }

    /// Bending, capillary, osmotic, line tension, adsorption and
    /// aggregation forces, masked and stored in `self.forces`
    pub fn compute_mechanical_forces(&mut self) {
        let n = self.n_vertices();
        let mesh = &self.mesh;
        let geometry = &self.geometry;
        let positions = &self.fields.positions;
        let phi = &self.fields.protein_density;
        let h0 = &self.fields.spontaneous_curvature;
        let kb = &self.fields.bending_modulus;

        let gamma = self.surface_tension();
        let pressure = self.osmotic_pressure();
        let epsilon = self.parameters.adsorption.epsilon;
        let chi = self.parameters.aggregation.chi;
        let eta = self.parameters.dirichlet.eta;

        let mean_curvature: Vec<f64> = (0..n).map(|v| geometry.mean_curvature(v)).collect();
        let face_gradients: Vec<DVec3> = if eta != 0.0 {
            (0..mesh.n_faces())
                .map(|f| geometry.face_gradient(mesh, positions, f, phi))
                .collect()
        } else {
            Vec::new()
        };

        let mut schlafli = vec![DVec3::ZERO; n];
        let mut area = vec![DVec3::ZERO; n];
        let mut gauss = vec![DVec3::ZERO; n];
        let mut capillary = vec![DVec3::ZERO; n];
        let mut osmotic = vec![DVec3::ZERO; n];
        let mut line_tension = vec![DVec3::ZERO; n];
        let mut adsorption = vec![DVec3::ZERO; n];
        let mut aggregation = vec![DVec3::ZERO; n];

        for i in 0..n {
            let hi = mean_curvature[i];
            let bend_i = kb[i] * (hi - h0[i]);
            let bend_area_i = kb[i] * (h0[i] * h0[i] - hi * hi);

            for he in mesh.outgoing_halfedges(i) {
                let j = mesh.tip(he);
                let hj = mean_curvature[j];
                let bend_j = kb[j] * (hj - h0[j]);
                let bend_area_j = kb[j] * (h0[j] * h0[j] - hj * hj);

                let vectors = halfedge_vectors(mesh, positions, geometry, he);

                gauss[i] -= (bend_i + bend_j) * vectors.gauss_vector;
                area[i] -= (bend_area_i / 3.0 + bend_area_j * 2.0 / 3.0) * vectors.area_gradient;
                schlafli[i] -= bend_i * vectors.schlafli_tail + bend_j * vectors.schlafli_tip;

                capillary[i] -= gamma * vectors.area_gradient;
                osmotic[i] += pressure * vectors.volume_gradient;
                adsorption[i] -=
                    epsilon * (phi[i] / 3.0 + 2.0 * phi[j] / 3.0) * vectors.area_gradient;
                aggregation[i] -= chi
                    * (phi[i] * phi[i] / 3.0 + 2.0 * phi[j] * phi[j] / 3.0)
                    * vectors.area_gradient;

                if eta != 0.0 && phi[i] > 0.1 && phi[i] < 0.9 {
                    if let Some(f) = mesh.face(he) {
                        let normal = geometry.face_normals[f];
                        let face_area = geometry.face_areas[f];
                        let grad_norm2 = grad_norm2_gradient(mesh, positions, normal, he, phi);
                        let face_area_gradient =
                            0.5 * normal.cross(halfedge_vector(mesh, positions, mesh.next(he)));
                        line_tension[i] -= eta
                            * (0.125 * grad_norm2 / face_area
                                - 0.5 * face_gradients[f].length_squared() * face_area_gradient);
                    }
                }
            }
        }

        let forces = &mut self.forces;
        let mask = &self.fields.force_mask;
        let normals = &geometry.vertex_normals;
        let masked = |field: Vec<DVec3>| -> Vec<DVec3> {
            field.iter().zip(mask).map(|(f, m)| *f * *m).collect()
        };
        let project = |field: &[DVec3]| -> Vec<f64> {
            field.iter().zip(normals).map(|(f, n)| f.dot(*n)).collect()
        };

        forces.bending_components.schlafli = masked(schlafli);
        forces.bending_components.area = masked(area);
        forces.bending_components.gauss = masked(gauss);
        let components = &forces.bending_components;
        let bending: Vec<DVec3> = (0..n)
            .map(|v| components.schlafli[v] + components.area[v] + components.gauss[v])
            .collect();
        forces.bending = bending;
        forces.capillary = masked(capillary);
        forces.osmotic = masked(osmotic);
        forces.line_tension = masked(line_tension);
        forces.adsorption = masked(adsorption);
        forces.aggregation = masked(aggregation);
        forces.surface_tension = gamma;
        forces.osmotic_pressure = pressure;

        forces.projections.bending = project(&forces.bending);
        forces.projections.capillary = project(&forces.capillary);
        forces.projections.osmotic = project(&forces.osmotic);
        forces.projections.line_tension = project(&forces.line_tension);
        forces.projections.adsorption = project(&forces.adsorption);
        forces.projections.aggregation = project(&forces.aggregation);
    }

    /// Decaying anchor force centered on the tracked point
    pub fn compute_external_force(&mut self) {
        let external = &self.parameters.external;
        let n = self.n_vertices();
        self.forces.external = if external.kf != 0.0 {
            let decay = (-self.time / external.decay_time).exp();
            (0..n)
                .map(|v| {
                    let magnitude = decay
                        * external.kf
                        * gaussian(self.fields.geodesic_distance[v], external.standard_deviation)
                        * self.geometry.vertex_dual_areas[v];
                    DVec3::Z * magnitude * self.fields.force_mask[v]
                })
                .collect()
        } else {
            vec![DVec3::ZERO; n]
        };
        self.forces.projections.external = self
            .forces
            .external
            .iter()
            .zip(&self.geometry.vertex_normals)
            .map(|(f, n)| f.dot(*n))
            .collect();
    }

    /// Chemical potential μ = −∂E/∂φ, masked by the protein mask
    pub fn compute_chemical_potential(&mut self) {
        let n = self.n_vertices();
        let geometry = &self.geometry;
        let fields = &self.fields;
        let params = &self.parameters;
        let phi = &fields.protein_density;

        let laplacian = geometry.cotan_laplacian(&self.mesh, phi);
        let mu = &mut self.forces.chemical_potential;
        mu.adsorption = vec![0.0; n];
        mu.aggregation = vec![0.0; n];
        mu.bending = vec![0.0; n];
        mu.diffusion = vec![0.0; n];
        mu.interior_penalty = vec![0.0; n];

        for v in 0..n {
            let mask = fields.protein_mask[v];
            let dual_area = geometry.vertex_dual_areas[v];
            let h = geometry.mean_curvature(v);
            let h0 = fields.spontaneous_curvature[v];
            let kb = fields.bending_modulus[v];
            let (_, slope) = params.bending.relation.profile(phi[v]);
            let dh0 = params.bending.h0c * slope;
            let dkb = params.bending.kbc * slope;

            mu.adsorption[v] = -mask * params.adsorption.epsilon * dual_area;
            mu.aggregation[v] = -mask * 2.0 * params.aggregation.chi * phi[v] * dual_area;
            mu.bending[v] =
                -mask * dual_area * ((h - h0) * (h - h0) * dkb - 2.0 * kb * (h - h0) * dh0);
            mu.diffusion[v] = -mask * params.dirichlet.eta * laplacian[v];
            mu.interior_penalty[v] = mask
                * params.protein.interior_penalty
                * (1.0 / phi[v] - 1.0 / (1.0 - phi[v]));
        }
        mu.total = (0..n)
            .map(|v| {
                mu.adsorption[v]
                    + mu.aggregation[v]
                    + mu.bending[v]
                    + mu.diffusion[v]
                    + mu.interior_penalty[v]
            })
            .collect();
    }

    /// Conservative forces, external force and chemical potential.
    ///
    /// Thermostat forces are left untouched.
    pub fn compute_conservative_forcing(&mut self) {
        let n = self.n_vertices();
        if self.forces.n_vertices() != n {
            self.forces = crate::state::Forces::new(n);
        }

        if self.parameters.variation.shape {
            self.compute_mechanical_forces();
            self.compute_external_force();
            let f = &self.forces;
            let mechanical: Vec<DVec3> = (0..n)
                .map(|v| {
                    f.bending[v]
                        + f.capillary[v]
                        + f.osmotic[v]
                        + f.line_tension[v]
                        + f.adsorption[v]
                        + f.aggregation[v]
                        + f.external[v]
                })
                .collect();
            self.forces.mechanical = mechanical;
        } else {
            self.forces.mechanical = vec![DVec3::ZERO; n];
            self.forces.external = vec![DVec3::ZERO; n];
        }
        self.forces.projections.mechanical = self
            .forces
            .mechanical
            .iter()
            .zip(&self.geometry.vertex_normals)
            .map(|(f, n)| f.dot(*n))
            .collect();

        if self.parameters.variation.protein {
            self.compute_chemical_potential();
        } else {
            self.forces.chemical_potential = crate::state::Forces::new(n).chemical_potential;
        }
    }

    /// All physical forcing of the current configuration, including the
    /// DPD thermostat driven by `rng`
    pub fn compute_physical_forcing<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f64) {
        self.compute_conservative_forcing();

        let dpd = &self.parameters.dpd;
        let n = self.n_vertices();
        if self.parameters.variation.shape && (dpd.gamma != 0.0 || dpd.temperature != 0.0) {
            let (damping, stochastic) = dpd::compute_dpd_forces(
                &self.mesh,
                &self.fields.positions,
                &self.fields.velocities,
                dpd.gamma,
                dpd.temperature,
                dt,
                rng,
            );
            let mask = &self.fields.force_mask;
            self.forces.damping = damping.iter().zip(mask).map(|(f, m)| *f * *m).collect();
            self.forces.stochastic = stochastic.iter().zip(mask).map(|(f, m)| *f * *m).collect();
        } else {
            self.forces.damping = vec![DVec3::ZERO; n];
            self.forces.stochastic = vec![DVec3::ZERO; n];
        }
    }

    /// Euclidean norm of the masked mechanical force
    pub fn mechanical_norm(&self) -> f64 {
        self.forces
            .mechanical
            .iter()
            .map(|f| f.length_squared())
            .sum::<f64>()
            .sqrt()
    }

    /// Euclidean norm of the masked chemical potential
    pub fn chemical_norm(&self) -> f64 {
        self.forces
            .chemical_potential
            .total
            .iter()
            .map(|m| m * m)
            .sum::<f64>()
            .sqrt()
    }
}
