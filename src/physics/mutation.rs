//! Mesh mutation: vertex shift, split/collapse, edge flips and smoothing.
//!
//! Topology edits run on a `MeshEditor` next to a working copy of the
//! vertex fields that grows in step with the editor's vertex slots. Only
//! "original" edges are considered, meaning neither endpoint was touched
//! earlier in the same cycle. The cycle ends with a compress that rebuilds
//! the mesh and re-indexes every field.

use glam::DVec3;

use super::forces::angle;
use super::system::{length_cross_ratio, ReferenceGeometry};
use super::MembraneSystem;
use crate::config::{MeshMutatorOptions, SmoothingMode};
use crate::error::{Result, TopologyError};
use crate::geometry::MeshEditor;
use crate::state::{Forces, VertexFields};

/// Number of flip sweeps per cycle
const FLIP_PASSES: usize = 3;

/// Edge and face-pair thresholds, zeros resolved against the reference mesh
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    long_edge: f64,
    short_edge: f64,
    large_pair: f64,
    small_pair: f64,
}

impl Thresholds {
    fn resolve(options: &MeshMutatorOptions, reference: &ReferenceGeometry) -> Self {
        let target_length = if options.target_edge_length > 0.0 {
            options.target_edge_length
        } else {
            reference.mean_edge_length
        };
        let max_face_area = if options.max_face_area > 0.0 {
            options.max_face_area
        } else {
            2.0 * reference.mean_face_area
        };
        let min_face_area = if options.min_face_area > 0.0 {
            options.min_face_area
        } else {
            0.5 * reference.mean_face_area
        };
        Self {
            long_edge: 4.0 / 3.0 * target_length,
            short_edge: 0.8 * target_length,
            large_pair: 2.0 * max_face_area,
            small_pair: 2.0 * min_face_area,
        }
    }
}

fn triangle_area(positions: &[DVec3], [i, j, k]: [usize; 3]) -> f64 {
    0.5 * (positions[j] - positions[i])
        .cross(positions[k] - positions[i])
        .length()
}

/// Point on the perpendicular bisector of the two boundary neighbors of
/// `v`, closest to `x`
fn boundary_shift_target(v: usize, x: DVec3, ends: &[DVec3]) -> Result<DVec3> {
    let &[x1, x2] = ends else {
        return Err(TopologyError::BoundaryNeighbors {
            vertex: v,
            count: ends.len(),
        }
        .into());
    };
    let bary = 0.5 * (x1 + x2);
    let face_normal = (x1 - x).cross(x2 - x);
    let side = face_normal.cross(x1 - x2).normalize_or_zero();
    Ok(bary - side.dot(bary - x) * side)
}

/// Combined area of the faces sharing edge (a, b)
fn pair_area(editor: &MeshEditor, positions: &[DVec3], a: usize, b: usize) -> f64 {
    editor
        .incident_faces(a)
        .into_iter()
        .filter(|face| face.contains(&b))
        .map(|face| triangle_area(positions, face))
        .sum()
}

/// Append the fields of a vertex inserted at the midpoint of (a, b)
fn push_midpoint(fields: &mut VertexFields, a: usize, b: usize) {
    let mid = |x: f64, y: f64| 0.5 * (x + y);
    fields.positions.push(0.5 * (fields.positions[a] + fields.positions[b]));
    fields.velocities.push(0.5 * (fields.velocities[a] + fields.velocities[b]));
    fields
        .protein_density
        .push(mid(fields.protein_density[a], fields.protein_density[b]));
    fields
        .protein_velocity
        .push(mid(fields.protein_velocity[a], fields.protein_velocity[b]));
    fields
        .spontaneous_curvature
        .push(mid(fields.spontaneous_curvature[a], fields.spontaneous_curvature[b]));
    fields
        .bending_modulus
        .push(mid(fields.bending_modulus[a], fields.bending_modulus[b]));
    fields
        .geodesic_distance
        .push(mid(fields.geodesic_distance[a], fields.geodesic_distance[b]));
    fields.force_mask.push(DVec3::ONE);
    fields.protein_mask.push(1.0);
    fields.tracked.push(false);
}

/// Fold the fields of `remove` into `keep`, placing it at `position`
fn merge_into(fields: &mut VertexFields, keep: usize, remove: usize, position: DVec3) {
    let mid = |x: f64, y: f64| 0.5 * (x + y);
    fields.positions[keep] = position;
    fields.velocities[keep] = 0.5 * (fields.velocities[keep] + fields.velocities[remove]);
    fields.protein_density[keep] = mid(fields.protein_density[keep], fields.protein_density[remove]);
    fields.protein_velocity[keep] =
        mid(fields.protein_velocity[keep], fields.protein_velocity[remove]);
    fields.spontaneous_curvature[keep] =
        mid(fields.spontaneous_curvature[keep], fields.spontaneous_curvature[remove]);
    fields.bending_modulus[keep] = mid(fields.bending_modulus[keep], fields.bending_modulus[remove]);
    fields.geodesic_distance[keep] =
        fields.geodesic_distance[keep].min(fields.geodesic_distance[remove]);
    fields.tracked[keep] |= fields.tracked[remove];
}

/// Root of the squared residual over the outlier vertices
fn outlier_norm(residual: &[f64], outliers: &[bool]) -> f64 {
    residual
        .iter()
        .zip(outliers)
        .filter(|(_, &o)| o)
        .map(|(r, _)| r * r)
        .sum::<f64>()
        .sqrt()
}

impl MembraneSystem {
    /// Run one mutation cycle; returns whether the connectivity changed
    pub fn mutate_mesh(&mut self, options: &MeshMutatorOptions) -> Result<bool> {
        if options.shift_vertex {
            self.vertex_shift()?;
        }

        let region = if options.changes_topology() {
            self.remesh(options)?
        } else {
            None
        };
        let changed = region.is_some();

        match options.smoothing {
            SmoothingMode::None => {}
            SmoothingMode::Global {
                target,
                initial_step,
                max_iterations,
            } => self.smooth_global(target, initial_step, max_iterations),
            SmoothingMode::Local { iterations, step } => {
                if let Some(region) = &region {
                    self.smooth_local(region, iterations, step);
                }
            }
        }

        if changed {
            log::debug!(
                "Mesh mutated: {} vertices, {} faces",
                self.mesh.n_vertices(),
                self.mesh.n_faces()
            );
        }
        Ok(changed)
    }

    /// Move free vertices tangentially toward the barycenter of their ring.
    ///
    /// Boundary vertices slide along the perpendicular bisector of their
    /// two boundary neighbors.
    pub fn vertex_shift(&mut self) -> Result<()> {
        let mesh = &self.mesh;
        let positions = &self.fields.positions;
        let normals = &self.geometry.vertex_normals;
        let mut shifted = positions.clone();

        for v in 0..mesh.n_vertices() {
            let mask = self.fields.force_mask[v];
            if mask.x + mask.y + mask.z < 0.5 {
                continue;
            }
            let x = positions[v];
            let target = if mesh.is_boundary_vertex(v) {
                let ends: Vec<DVec3> = mesh
                    .outgoing_halfedges(v)
                    .filter(|&he| mesh.is_boundary_edge(mesh.edge(he)))
                    .map(|he| positions[mesh.tip(he)])
                    .collect();
                boundary_shift_target(v, x, &ends)?
            } else {
                let ring: Vec<DVec3> = mesh.neighbors(v).map(|u| positions[u]).collect();
                let bary = ring.iter().copied().sum::<DVec3>() / ring.len() as f64;
                let n = normals[v];
                bary - n.dot(bary - x) * n
            };
            shifted[v] = x + (target - x) * mask;
        }

        self.fields.positions = shifted;
        self.update_configuration();
        Ok(())
    }

    /// Split/collapse and flip passes followed by a compress.
    ///
    /// Returns the vertices touched by an edit, in the new indexing, or
    /// `None` when nothing changed.
    fn remesh(&mut self, options: &MeshMutatorOptions) -> Result<Option<Vec<bool>>> {
        let thresholds = Thresholds::resolve(options, &self.reference);
        let mut editor = MeshEditor::new(&self.mesh);
        let mut work = self.fields.clone();
        let mut touched = vec![false; self.mesh.n_vertices()];
        let mut region = touched.clone();
        let mut changed = false;

        let edges: Vec<(usize, usize)> = (0..self.mesh.n_edges())
            .map(|e| self.mesh.edge_vertices(e))
            .collect();
        let flat = |e: usize| self.geometry.edge_dihedral_angles[e].abs() < options.flat_dihedral;

        for (e, &(a, b)) in edges.iter().enumerate() {
            if touched[a] || touched[b] {
                continue;
            }
            let (Some(ka), Some(kb)) = (editor.key(a), editor.key(b)) else {
                continue;
            };
            let length = (work.positions[a] - work.positions[b]).length();
            let area = pair_area(&editor, &work.positions, a, b);
            let curvature = self
                .geometry
                .mean_curvature(a)
                .abs()
                .max(self.geometry.mean_curvature(b).abs());

            let split = (options.split_long && length > thresholds.long_edge)
                || (options.split_large && area > thresholds.large_pair)
                || (options.split_curved && length * curvature > options.curvature_tolerance);
            if split {
                if editor.split(ka, kb)?.is_some() {
                    push_midpoint(&mut work, a, b);
                    touched[a] = true;
                    touched[b] = true;
                    touched.resize(editor.n_vertex_slots(), true);
                    changed = true;
                }
                continue;
            }

            let collapse = ((options.collapse_short && length < thresholds.short_edge)
                || (options.collapse_small && area < thresholds.small_pair))
                && (!options.collapse_requires_flat || flat(e));
            if collapse {
                let free_a = work.force_mask[a] == DVec3::ONE;
                let free_b = work.force_mask[b] == DVec3::ONE;
                let (keep, remove, position) = match (free_a, free_b) {
                    (true, true) => (ka, kb, 0.5 * (work.positions[a] + work.positions[b])),
                    (false, true) => (ka, kb, work.positions[a]),
                    (true, false) => (kb, ka, work.positions[b]),
                    (false, false) => continue,
                };
                if editor.collapse(keep, remove)?.is_some() {
                    merge_into(&mut work, keep.index(), remove.index(), position);
                    touched[a] = true;
                    touched[b] = true;
                    changed = true;
                }
            }
        }

        if options.flip_non_delaunay {
            for _ in 0..FLIP_PASSES {
                for (e, &(a, b)) in edges.iter().enumerate() {
                    if touched[a] || touched[b] || !editor.has_edge(a, b) {
                        continue;
                    }
                    if editor.is_boundary_edge(a, b)
                        || work.force_mask[a] != DVec3::ONE
                        || work.force_mask[b] != DVec3::ONE
                    {
                        continue;
                    }
                    if options.flip_requires_flat && !flat(e) {
                        continue;
                    }
                    let Some((c, d)) = editor.edge_opposites(a, b) else {
                        continue;
                    };
                    let p = &work.positions;
                    let opposite_angles =
                        angle(p[a] - p[c], p[b] - p[c]) + angle(p[a] - p[d], p[b] - p[d]);
                    if opposite_angles <= std::f64::consts::PI {
                        continue;
                    }
                    let (Some(ka), Some(kb)) = (editor.key(a), editor.key(b)) else {
                        continue;
                    };
                    if editor.flip(ka, kb)? {
                        for v in [a, b, c, d] {
                            region[v] = true;
                        }
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            return Ok(None);
        }

        let compressed = editor.compress()?;
        let n = compressed.mesh.n_vertices();
        work.remap(&compressed.vertex_map, n);

        let mut touched_new = vec![false; n];
        for (old, new) in compressed.vertex_map.iter().enumerate() {
            if let Some(new) = *new {
                touched_new[new] = touched[old] || region.get(old).copied().unwrap_or(false);
            }
        }

        self.mesh = compressed.mesh;
        self.fields = work;
        self.forces = Forces::new(n);

        let count = self.fields.tracked_count();
        if count != 1 {
            return Err(TopologyError::TrackedPoint(count).into());
        }

        self.update_configuration();
        self.reference.cross_ratios = (0..self.mesh.n_edges())
            .map(|e| length_cross_ratio(&self.mesh, &self.fields.positions, e).unwrap_or(0.0))
            .collect();
        self.update_geodesics();
        Ok(Some(touched_new))
    }

    /// Normal bending residual used by global smoothing
    fn bending_residual(&mut self) -> Vec<f64> {
        self.compute_mechanical_forces();
        self.forces.projections.bending.clone()
    }

    /// Gradient descent on the bending residual of outlier vertices.
    ///
    /// A vertex is an outlier when its residual deviates from the mean by
    /// more than half the largest magnitude. Steps that do not reduce the
    /// residual norm are undone and the step halved.
    fn smooth_global(&mut self, target: f64, initial_step: f64, max_iterations: usize) {
        let mut residual = self.bending_residual();
        let n = residual.len();
        if n == 0 {
            return;
        }
        let mean = residual.iter().sum::<f64>() / n as f64;
        let largest = residual.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        let outliers: Vec<bool> = residual
            .iter()
            .map(|r| (r - mean).abs() > 0.5 * largest)
            .collect();

        let initial = outlier_norm(&residual, &outliers);
        let mut norm = initial;
        let mut step = initial_step;
        let mut iterations = 0;
        while iterations < max_iterations && norm > target * initial {
            iterations += 1;
            let saved = self.fields.positions.clone();
            for v in (0..n).filter(|&v| outliers[v]) {
                let normal = self.geometry.vertex_normals[v];
                self.fields.positions[v] += step * residual[v] * normal;
            }
            self.update_configuration();

            let trial = self.bending_residual();
            let trial_norm = outlier_norm(&trial, &outliers);
            if trial_norm.is_finite() && trial_norm < norm {
                residual = trial;
                norm = trial_norm;
            } else {
                self.fields.positions = saved;
                self.update_configuration();
                step *= 0.5;
            }
        }
        log::debug!(
            "Global smoothing: residual {:.3e} -> {:.3e} in {} iterations",
            initial,
            norm,
            iterations
        );
    }

    /// Relax mean curvature over `region` by moving vertices along the
    /// normal against the cotan Laplacian of H
    fn smooth_local(&mut self, region: &[bool], iterations: usize, step: f64) {
        let n = self.n_vertices();
        for _ in 0..iterations {
            let curvature: Vec<f64> = (0..n).map(|v| self.geometry.mean_curvature(v)).collect();
            let laplacian = self.geometry.cotan_laplacian(&self.mesh, &curvature);
            for v in (0..n).filter(|&v| region.get(v).copied().unwrap_or(false)) {
                let normal = self.geometry.vertex_normals[v];
                self.fields.positions[v] -=
                    step * laplacian[v] * normal * self.fields.force_mask[v];
            }
            self.update_configuration();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OsmoticPolicy, Parameters};
    use crate::geometry::primitives;

    fn sphere(subdivisions: usize) -> MembraneSystem {
        let (faces, positions) = primitives::icosphere(1.0, subdivisions);
        MembraneSystem::new(&faces, positions, Parameters::default(), None).unwrap()
    }

    fn ring_barycenter(system: &MembraneSystem, v: usize) -> DVec3 {
        let ring: Vec<DVec3> = system
            .mesh
            .neighbors(v)
            .map(|u| system.fields.positions[u])
            .collect();
        ring.iter().copied().sum::<DVec3>() / ring.len() as f64
    }

    #[test]
    fn test_vertex_shift_recenters_interior_vertex() {
        let mut system = sphere(2);
        let v = 10;
        let tangent = system.geometry.vertex_normals[v].any_orthonormal_vector();
        system.fields.positions[v] += 0.05 * tangent;
        system.update_configuration();
        let before = (system.fields.positions[v] - ring_barycenter(&system, v)).length();

        system.vertex_shift().unwrap();
        let after = (system.fields.positions[v] - ring_barycenter(&system, v)).length();
        assert!(after < before);
    }

    #[test]
    fn test_vertex_shift_centers_boundary_vertex() {
        let (faces, positions) = primitives::hexagon(1.0, 2);
        let mut params = Parameters::default();
        params.osmotic.policy = OsmoticPolicy::ConstantPressure;
        let mut system = MembraneSystem::new(&faces, positions, params, None).unwrap();
        let v = (0..system.n_vertices())
            .find(|&v| system.mesh.is_boundary_vertex(v))
            .unwrap();
        let ends: Vec<usize> = system
            .mesh
            .outgoing_halfedges(v)
            .filter(|&he| system.mesh.is_boundary_edge(system.mesh.edge(he)))
            .map(|he| system.mesh.tip(he))
            .collect();
        let along = (system.fields.positions[ends[0]] - system.fields.positions[ends[1]]).normalize();
        system.fields.positions[v] += 0.05 * along;
        system.update_configuration();
        // Neighbors shift in the same sweep, so measure against their old places
        let (x1, x2) = (
            system.fields.positions[ends[0]],
            system.fields.positions[ends[1]],
        );

        system.vertex_shift().unwrap();
        let x = system.fields.positions[v];
        let d1 = (x - x1).length();
        let d2 = (x - x2).length();
        assert!((d1 - d2).abs() < 1e-9, "d1 = {}, d2 = {}", d1, d2);
    }

    #[test]
    fn test_boundary_shift_requires_two_boundary_neighbors() {
        let x = DVec3::new(0.1, 0.2, 0.0);
        let ends = [DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0)];
        let target = boundary_shift_target(4, x, &ends).unwrap();
        assert!((target - DVec3::new(0.0, 0.2, 0.0)).length() < 1e-12);

        let pinched = [ends[0], ends[1], DVec3::new(0.0, 1.0, 0.0)];
        assert!(matches!(
            boundary_shift_target(4, x, &pinched),
            Err(crate::SimulationError::Topology(TopologyError::BoundaryNeighbors {
                vertex: 4,
                count: 3
            }))
        ));
        assert!(matches!(
            boundary_shift_target(4, x, &ends[..1]),
            Err(crate::SimulationError::Topology(TopologyError::BoundaryNeighbors {
                count: 1,
                ..
            }))
        ));
    }

    #[test]
    fn test_split_long_edges() {
        let mut system = sphere(1);
        let n = system.n_vertices();
        let options = MeshMutatorOptions {
            split_long: true,
            target_edge_length: 0.5 * system.reference.mean_edge_length,
            ..Default::default()
        };
        assert!(system.mutate_mesh(&options).unwrap());
        assert!(system.n_vertices() > n);
        assert_eq!(system.mesh.euler_characteristic(), 2);
        assert_eq!(system.fields.tracked_count(), 1);
        assert_eq!(system.fields.n_vertices(), system.n_vertices());
        assert_eq!(system.geometry.vertex_normals.len(), system.n_vertices());
    }

    #[test]
    fn test_collapse_short_edges() {
        let mut system = sphere(2);
        let n = system.n_vertices();
        let options = MeshMutatorOptions {
            collapse_short: true,
            target_edge_length: 2.0 * system.reference.mean_edge_length,
            ..Default::default()
        };
        assert!(system.mutate_mesh(&options).unwrap());
        assert!(system.n_vertices() < n);
        assert_eq!(system.mesh.euler_characteristic(), 2);
        assert_eq!(system.fields.tracked_count(), 1);
        for &phi in &system.fields.protein_density {
            assert!((phi - 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn test_flip_restores_delaunay() {
        let mut system = sphere(2);
        let v = 12;
        // Push the vertex most of the way to a ring edge so the angle it
        // subtends over that edge becomes obtuse
        let he = system.mesh.outgoing_halfedges(v).next().unwrap();
        let ring_edge = system.mesh.next(he);
        let midpoint = 0.5
            * (system.fields.positions[system.mesh.tail(ring_edge)]
                + system.fields.positions[system.mesh.tip(ring_edge)]);
        let x = system.fields.positions[v];
        system.fields.positions[v] = x + 0.8 * (midpoint - x);
        system.update_configuration();
        let (n, faces) = (system.n_vertices(), system.mesh.n_faces());

        let options = MeshMutatorOptions {
            flip_non_delaunay: true,
            ..Default::default()
        };
        assert!(system.mutate_mesh(&options).unwrap());
        assert_eq!(system.n_vertices(), n);
        assert_eq!(system.mesh.n_faces(), faces);
        assert_eq!(system.mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_mutation_without_candidates_is_noop() {
        let mut system = sphere(1);
        let options = MeshMutatorOptions {
            split_long: true,
            collapse_short: true,
            ..Default::default()
        };
        // Default thresholds bracket the mean edge length of a regular mesh
        assert!(!system.mutate_mesh(&options).unwrap());
        assert_eq!(system.n_vertices(), 42);
    }

    #[test]
    fn test_global_smoothing_does_not_increase_residual() {
        let mut params = Parameters::default();
        params.bending.kb = 1.0;
        let (faces, positions) = primitives::icosphere(1.0, 2);
        let mut system = MembraneSystem::new(&faces, positions, params, None).unwrap();
        let normal = system.geometry.vertex_normals[3];
        system.fields.positions[3] += 0.1 * normal;
        system.update_configuration();

        let before = system.bending_residual();
        let mean = before.iter().sum::<f64>() / before.len() as f64;
        let largest = before.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        let outliers: Vec<bool> = before.iter().map(|r| (r - mean).abs() > 0.5 * largest).collect();

        system.smooth_global(0.1, 0.01, 20);
        let after = system.bending_residual();
        assert!(outlier_norm(&after, &outliers) <= outlier_norm(&before, &outliers));
    }

    #[test]
    fn test_local_smoothing_moves_only_region() {
        let mut system = sphere(2);
        system.fields.positions[3] *= 1.1;
        system.update_configuration();
        let original = system.fields.positions.clone();
        let mut region = vec![false; system.n_vertices()];
        region[3] = true;

        system.smooth_local(&region, 2, 0.01);
        for (v, (a, b)) in original.iter().zip(&system.fields.positions).enumerate() {
            if v != 3 {
                assert_eq!(a, b);
            }
        }
        assert_ne!(original[3], system.fields.positions[3]);
    }
}
