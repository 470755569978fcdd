//! Primitive membrane meshes.
//!
//! Closed vesicles start from a subdivided icosahedron; open patches are a
//! cylindrical tube or a flat hexagon. All faces are wound so normals point
//! outward (away from the origin or along +z for flat patches).

use std::collections::HashMap;

use glam::DVec3;

/// Face list plus vertex positions
pub type MeshData = (Vec<[usize; 3]>, Vec<DVec3>);

/// Icosphere of the given radius after `subdivisions` rounds of 1-to-4 splits.
///
/// One subdivision yields 42 vertices and 80 faces.
pub fn icosphere(radius: f64, subdivisions: usize) -> MeshData {
    let phi = (1.0 + 5.0_f64.sqrt()) * 0.5;

    let mut positions = vec![
        DVec3::new(-1.0, phi, 0.0),
        DVec3::new(1.0, phi, 0.0),
        DVec3::new(-1.0, -phi, 0.0),
        DVec3::new(1.0, -phi, 0.0),
        DVec3::new(0.0, -1.0, phi),
        DVec3::new(0.0, 1.0, phi),
        DVec3::new(0.0, -1.0, -phi),
        DVec3::new(0.0, 1.0, -phi),
        DVec3::new(phi, 0.0, -1.0),
        DVec3::new(phi, 0.0, 1.0),
        DVec3::new(-phi, 0.0, -1.0),
        DVec3::new(-phi, 0.0, 1.0),
    ];
    for p in &mut positions {
        *p = p.normalize() * radius;
    }

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    orient_outward(&mut faces, &positions, |centroid| centroid);

    for _ in 0..subdivisions {
        faces = subdivide(&faces, &mut positions);
        for p in &mut positions {
            *p = p.normalize() * radius;
        }
    }

    (faces, positions)
}

/// Open cylinder along z, `n_radial` vertices per ring and `n_axial` rings of faces.
pub fn cylinder(radius: f64, height: f64, n_radial: usize, n_axial: usize) -> MeshData {
    let n_radial = n_radial.max(3);
    let n_axial = n_axial.max(1);
    let mut positions = Vec::with_capacity(n_radial * (n_axial + 1));
    for i in 0..=n_axial {
        let z = -0.5 * height + height * i as f64 / n_axial as f64;
        // Offset alternate rings by half a step for equilateral-ish triangles
        let offset = if i % 2 == 0 { 0.0 } else { 0.5 };
        for j in 0..n_radial {
            let theta = 2.0 * std::f64::consts::PI * (j as f64 + offset) / n_radial as f64;
            positions.push(DVec3::new(radius * theta.cos(), radius * theta.sin(), z));
        }
    }

    let index = |i: usize, j: usize| i * n_radial + j % n_radial;
    let mut faces = Vec::with_capacity(2 * n_radial * n_axial);
    for i in 0..n_axial {
        for j in 0..n_radial {
            let a = index(i, j);
            let b = index(i, j + 1);
            let c = index(i + 1, j + 1);
            let d = index(i + 1, j);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    orient_outward(&mut faces, &positions, |centroid| DVec3::new(centroid.x, centroid.y, 0.0));

    (faces, positions)
}

/// Flat hexagonal patch in the xy-plane with normals along +z.
pub fn hexagon(radius: f64, subdivisions: usize) -> MeshData {
    let mut positions = vec![DVec3::ZERO];
    for k in 0..6 {
        let theta = std::f64::consts::PI / 3.0 * k as f64;
        positions.push(DVec3::new(radius * theta.cos(), radius * theta.sin(), 0.0));
    }
    let mut faces: Vec<[usize; 3]> = (0..6).map(|k| [0, 1 + k, 1 + (k + 1) % 6]).collect();

    for _ in 0..subdivisions {
        faces = subdivide(&faces, &mut positions);
    }

    (faces, positions)
}

/// Loop-style 1-to-4 split with shared edge midpoints (no smoothing)
fn subdivide(faces: &[[usize; 3]], positions: &mut Vec<DVec3>) -> Vec<[usize; 3]> {
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
    let mut midpoint = |a: usize, b: usize, positions: &mut Vec<DVec3>| -> usize {
        let key = (a.min(b), a.max(b));
        *midpoints.entry(key).or_insert_with(|| {
            positions.push(0.5 * (positions[a] + positions[b]));
            positions.len() - 1
        })
    };

    let mut refined = Vec::with_capacity(4 * faces.len());
    for &[a, b, c] in faces {
        let ab = midpoint(a, b, positions);
        let bc = midpoint(b, c, positions);
        let ca = midpoint(c, a, positions);
        refined.push([a, ab, ca]);
        refined.push([b, bc, ab]);
        refined.push([c, ca, bc]);
        refined.push([ab, bc, ca]);
    }
    refined
}

/// Flip faces whose normal opposes the outward direction at their centroid
fn orient_outward(faces: &mut [[usize; 3]], positions: &[DVec3], outward: impl Fn(DVec3) -> DVec3) {
    for face in faces.iter_mut() {
        let [a, b, c] = face.map(|v| positions[v]);
        let normal = (b - a).cross(c - a);
        let centroid = (a + b + c) / 3.0;
        if normal.dot(outward(centroid)) < 0.0 {
            face.swap(1, 2);
        }
    }
}
