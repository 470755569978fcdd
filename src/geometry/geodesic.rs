//! Distance fields over the mesh.
//!
//! Geodesic distance is approximated by shortest paths along mesh edges
//! (Dijkstra). This overestimates the true surface distance by a bounded
//! factor on well-shaped meshes, which is adequate for localizing the
//! anchor force around the tracked point.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::DVec3;

use super::{GeometrySnapshot, SurfaceMesh};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f64,
    vertex: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| self.vertex.cmp(&other.vertex))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Edge-path distance from `source` to every vertex
pub fn distances(mesh: &SurfaceMesh, geometry: &GeometrySnapshot, source: usize) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; mesh.n_vertices()];
    let mut heap = BinaryHeap::new();
    dist[source] = 0.0;
    heap.push(Candidate {
        distance: 0.0,
        vertex: source,
    });

    while let Some(Candidate { distance, vertex }) = heap.pop() {
        if distance > dist[vertex] {
            continue;
        }
        for he in mesh.outgoing_halfedges(vertex) {
            let neighbor = mesh.tip(he);
            let candidate = distance + geometry.edge_lengths[mesh.edge(he)];
            if candidate < dist[neighbor] {
                dist[neighbor] = candidate;
                heap.push(Candidate {
                    distance: candidate,
                    vertex: neighbor,
                });
            }
        }
    }

    dist
}

/// Vertex nearest to `target`; with `planar` only x and y are compared
pub fn closest_vertex(positions: &[DVec3], target: DVec3, planar: bool) -> Option<usize> {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let d = if planar {
                (p.truncate() - target.truncate()).length_squared()
            } else {
                (*p - target).length_squared()
            };
            (i, d)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::primitives;

    #[test]
    fn test_distance_from_pole() {
        let (faces, positions) = primitives::icosphere(1.0, 2);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let geo = GeometrySnapshot::compute(&mesh, &positions);
        let pole = closest_vertex(&positions, DVec3::new(0.0, 1.0, 0.0), false).unwrap();
        let dist = distances(&mesh, &geo, pole);

        assert_eq!(dist[pole], 0.0);
        for (v, &d) in dist.iter().enumerate() {
            assert!(d.is_finite());
            // Edge paths are never shorter than the straight chord
            let chord = (positions[v] - positions[pole]).length();
            let arc = positions[v].dot(positions[pole]).clamp(-1.0, 1.0).acos();
            assert!(d >= chord - 1e-9, "Path {} shorter than chord {}", d, chord);
            assert!(d <= 1.5 * arc + 1e-9, "Path {} too long for arc {}", d, arc);
        }
    }

    #[test]
    fn test_planar_closest_vertex() {
        let positions = vec![
            DVec3::new(0.0, 0.0, 5.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        assert_eq!(closest_vertex(&positions, DVec3::ZERO, true), Some(0));
        assert_eq!(closest_vertex(&positions, DVec3::ZERO, false), Some(1));
    }
}
