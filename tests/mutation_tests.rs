//! Integration tests for mesh mutation.
//!
//! After any mutation cycle the mesh must stay a valid manifold, every
//! per-vertex field must match the new vertex count, and exactly one vertex
//! must remain tracked.

use glam::DVec3;
use membrane_simulator_x::{
    config::{OsmoticPolicy, ProteinDistribution, ShapeBoundaryCondition, SmoothingMode},
    geometry::primitives,
    MembraneSystem, MeshMutatorOptions, Parameters, SurfaceMesh,
};

fn wobbly_sphere(subdivisions: usize, params: Parameters) -> MembraneSystem {
    let (faces, positions) = primitives::icosphere(1.0, subdivisions);
    let positions = positions
        .into_iter()
        .map(|x| x * (1.0 + 0.1 * (3.0 * x.y).sin()))
        .collect();
    MembraneSystem::new(&faces, positions, params, None).unwrap()
}

fn patch(shape: ShapeBoundaryCondition) -> MembraneSystem {
    let (faces, positions) = primitives::hexagon(1.0, 3);
    let mut params = Parameters::default();
    params.osmotic.policy = OsmoticPolicy::ConstantPressure;
    params.boundary.shape = shape;
    params.point.position = [0.0, 0.0, 0.0];
    MembraneSystem::new(&faces, positions, params, None).unwrap()
}

/// Manifold, aligned fields and a single tracked point
fn assert_consistent(system: &MembraneSystem) {
    let n = system.n_vertices();
    assert!(SurfaceMesh::from_faces(n, system.mesh.faces()).is_ok());
    assert_eq!(system.fields.n_vertices(), n);
    assert_eq!(system.fields.protein_density.len(), n);
    assert_eq!(system.fields.force_mask.len(), n);
    assert_eq!(system.fields.geodesic_distance.len(), n);
    assert_eq!(system.geometry.vertex_dual_areas.len(), n);
    assert_eq!(system.forces.n_vertices(), n);
    assert_eq!(system.reference.cross_ratios.len(), system.mesh.n_edges());
    assert_eq!(system.fields.tracked_count(), 1);
    assert!(system.fields.positions.iter().all(|x| x.is_finite()));
}

// ============================================================================
// Closed surfaces
// ============================================================================

#[test]
fn test_full_cycle_preserves_closed_surface() {
    let mut system = wobbly_sphere(2, Parameters::default());
    let area = system.geometry.surface_area;
    let mean = system.reference.mean_edge_length;
    let options = MeshMutatorOptions {
        shift_vertex: true,
        flip_non_delaunay: true,
        split_long: true,
        collapse_short: true,
        target_edge_length: 0.7 * mean,
        ..Default::default()
    };

    for _ in 0..3 {
        system.mutate_mesh(&options).unwrap();
        assert_consistent(&system);
        assert_eq!(system.mesh.euler_characteristic(), 2);
        assert!(!system.mesh.has_boundary());
    }
    // Midpoint splits and tangential shifts barely change the area
    assert!((system.geometry.surface_area - area).abs() / area < 0.1);
}

#[test]
fn test_collapse_then_split_round_trip() {
    let mut system = wobbly_sphere(2, Parameters::default());
    let n = system.n_vertices();
    let mean = system.reference.mean_edge_length;

    let coarsen = MeshMutatorOptions {
        collapse_short: true,
        target_edge_length: 2.0 * mean,
        ..Default::default()
    };
    assert!(system.mutate_mesh(&coarsen).unwrap());
    let coarse = system.n_vertices();
    assert!(coarse < n);
    assert_consistent(&system);

    let refine = MeshMutatorOptions {
        split_long: true,
        target_edge_length: 0.5 * mean,
        ..Default::default()
    };
    assert!(system.mutate_mesh(&refine).unwrap());
    assert!(system.n_vertices() > coarse);
    assert_consistent(&system);
    assert_eq!(system.mesh.euler_characteristic(), 2);
}

#[test]
fn test_split_interpolates_protein_density() {
    let mut params = Parameters::default();
    params.protein.initial = ProteinDistribution::Disk {
        radius: 1.0,
        inside: 0.8,
        outside: 0.2,
        sharpness: 3.0,
    };
    let mut system = wobbly_sphere(1, params);
    let (lo, hi) = system
        .fields
        .protein_density
        .iter()
        .fold((1.0_f64, 0.0_f64), |(lo, hi), &p| (lo.min(p), hi.max(p)));

    let options = MeshMutatorOptions {
        split_long: true,
        target_edge_length: 0.5 * system.reference.mean_edge_length,
        ..Default::default()
    };
    assert!(system.mutate_mesh(&options).unwrap());
    assert_consistent(&system);
    for &phi in &system.fields.protein_density {
        assert!(phi >= lo - 1e-12 && phi <= hi + 1e-12);
    }
}

#[test]
fn test_floating_point_relocates_after_mutation() {
    let mut params = Parameters::default();
    params.point.is_floating = true;
    params.point.position = [0.0, 0.0, 1.0];
    let mut system = wobbly_sphere(2, params);
    let options = MeshMutatorOptions {
        collapse_short: true,
        target_edge_length: 2.0 * system.reference.mean_edge_length,
        ..Default::default()
    };
    system.mutate_mesh(&options).unwrap();
    assert_consistent(&system);

    let tracked = system.fields.tracked_point().unwrap();
    let distance = |x: DVec3| (x - DVec3::Z).length();
    let nearest = system
        .fields
        .positions
        .iter()
        .map(|&x| distance(x))
        .fold(f64::INFINITY, f64::min);
    assert!((distance(system.fields.positions[tracked]) - nearest).abs() < 1e-12);
    assert_eq!(system.fields.geodesic_distance[tracked], 0.0);
}

#[test]
fn test_smoothing_after_remesh_keeps_surface_valid() {
    let mut params = Parameters::default();
    params.bending.kb = 1.0;
    let mut system = wobbly_sphere(2, params);
    let options = MeshMutatorOptions {
        split_long: true,
        target_edge_length: 0.6 * system.reference.mean_edge_length,
        smoothing: SmoothingMode::Local {
            iterations: 5,
            step: 1e-3,
        },
        ..Default::default()
    };
    assert!(system.mutate_mesh(&options).unwrap());
    assert_consistent(&system);
}

// ============================================================================
// Open patches
// ============================================================================

#[test]
fn test_split_on_patch_keeps_single_boundary() {
    let mut system = patch(ShapeBoundaryCondition::None);
    let n = system.n_vertices();
    let options = MeshMutatorOptions {
        split_long: true,
        target_edge_length: 0.5 * system.reference.mean_edge_length,
        ..Default::default()
    };
    assert!(system.mutate_mesh(&options).unwrap());
    assert!(system.n_vertices() > n);
    assert_consistent(&system);
    assert_eq!(system.mesh.n_boundary_loops(), 1);
    assert_eq!(system.mesh.euler_characteristic(), 1);
}

#[test]
fn test_pinned_boundary_survives_collapse() {
    let mut system = patch(ShapeBoundaryCondition::Pin);
    let boundary: Vec<DVec3> = (0..system.n_vertices())
        .filter(|&v| system.mesh.is_boundary_vertex(v))
        .map(|v| system.fields.positions[v])
        .collect();
    let options = MeshMutatorOptions {
        collapse_short: true,
        shift_vertex: true,
        target_edge_length: 2.0 * system.reference.mean_edge_length,
        ..Default::default()
    };
    system.mutate_mesh(&options).unwrap();
    assert_consistent(&system);

    // Constrained vertices are never the removed endpoint and never shift
    for x in boundary {
        assert!(system
            .fields
            .positions
            .iter()
            .any(|y| (*y - x).length() < 1e-12));
    }
}

#[test]
fn test_boundary_masks_are_rebuilt_after_split() {
    let mut system = patch(ShapeBoundaryCondition::Pin);
    let options = MeshMutatorOptions {
        split_long: true,
        target_edge_length: 0.5 * system.reference.mean_edge_length,
        ..Default::default()
    };
    assert!(system.mutate_mesh(&options).unwrap());
    for v in 0..system.n_vertices() {
        let expected = if system.mesh.is_boundary_vertex(v) {
            DVec3::ZERO
        } else {
            DVec3::ONE
        };
        assert_eq!(system.fields.force_mask[v], expected);
    }
}
