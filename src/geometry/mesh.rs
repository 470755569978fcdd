//! Halfedge connectivity for triangulated surfaces.
//!
//! The connectivity is always compact: it is built from a face list and
//! rebuilt wholesale after any topology mutation, so element indices are
//! dense in `0..n`. Boundary loops are represented by exterior halfedges
//! that carry no face, which lets every vertex orbit be traversed with
//! `next(twin(he))` regardless of whether the vertex lies on the boundary.

use std::collections::HashMap;

use crate::error::TopologyError;

/// Triangle mesh connectivity with explicit interior and exterior halfedges.
///
/// Halfedges `3f`, `3f + 1`, `3f + 2` belong to face `f` in the winding order
/// of the face; exterior (boundary) halfedges follow after `3 * n_faces`.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    faces: Vec<[usize; 3]>,
    n_vertices: usize,
    he_next: Vec<usize>,
    he_twin: Vec<usize>,
    he_tail: Vec<usize>,
    he_face: Vec<Option<usize>>,
    he_edge: Vec<usize>,
    vertex_he: Vec<usize>,
    vertex_boundary: Vec<bool>,
    edge_he: Vec<usize>,
}

impl SurfaceMesh {
    /// Build connectivity from a consistently oriented face list.
    ///
    /// Fails on out-of-range or repeated vertex indices, edges shared by more
    /// than two faces (or two faces with the same winding across an edge),
    /// vertices whose one-ring is not a single fan, and unreferenced vertices.
    pub fn from_faces(n_vertices: usize, faces: &[[usize; 3]]) -> Result<Self, TopologyError> {
        if faces.is_empty() || n_vertices == 0 {
            return Err(TopologyError::Empty);
        }

        for (f, face) in faces.iter().enumerate() {
            for &v in face {
                if v >= n_vertices {
                    return Err(TopologyError::VertexOutOfRange {
                        face: f,
                        vertex: v,
                        n_vertices,
                    });
                }
            }
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                return Err(TopologyError::DegenerateFace(f));
            }
        }

        let n_interior = 3 * faces.len();
        let mut he_next = Vec::with_capacity(n_interior + n_interior / 4);
        let mut he_tail = Vec::with_capacity(n_interior + n_interior / 4);
        let mut he_face = Vec::with_capacity(n_interior + n_interior / 4);

        // Interior halfedges, one triple per face
        let mut directed: HashMap<(usize, usize), usize> = HashMap::with_capacity(n_interior);
        for (f, face) in faces.iter().enumerate() {
            for k in 0..3 {
                let he = 3 * f + k;
                let tail = face[k];
                let tip = face[(k + 1) % 3];
                if directed.insert((tail, tip), he).is_some() {
                    return Err(TopologyError::NonManifoldEdge(tail.min(tip), tail.max(tip)));
                }
                he_next.push(3 * f + (k + 1) % 3);
                he_tail.push(tail);
                he_face.push(Some(f));
            }
        }

        // Twins, creating exterior halfedges where the opposite side is missing
        let mut he_twin = vec![usize::MAX; n_interior];
        let mut exterior_from: HashMap<usize, usize> = HashMap::new();
        for he in 0..n_interior {
            if he_twin[he] != usize::MAX {
                continue;
            }
            let tail = he_tail[he];
            let tip = he_tail[he_next[he]];
            match directed.get(&(tip, tail)) {
                Some(&twin) => {
                    he_twin[he] = twin;
                    he_twin[twin] = he;
                }
                None => {
                    let exterior = he_tail.len();
                    he_tail.push(tip);
                    he_face.push(None);
                    he_next.push(usize::MAX);
                    he_twin.push(he);
                    he_twin[he] = exterior;
                    if exterior_from.insert(tip, exterior).is_some() {
                        return Err(TopologyError::NonManifoldVertex(tip));
                    }
                }
            }
        }

        // Exterior loops: x -> v is followed by the exterior halfedge leaving v
        for he in n_interior..he_tail.len() {
            let tip = he_tail[he_twin[he]];
            match exterior_from.get(&tip) {
                Some(&next) => he_next[he] = next,
                None => return Err(TopologyError::NonManifoldVertex(tip)),
            }
        }

        // Edges, each represented by an interior halfedge
        let mut he_edge = vec![usize::MAX; he_tail.len()];
        let mut edge_he = Vec::with_capacity(he_tail.len() / 2);
        for he in 0..he_tail.len() {
            if he_edge[he] == usize::MAX {
                let e = edge_he.len();
                he_edge[he] = e;
                he_edge[he_twin[he]] = e;
                edge_he.push(if he_face[he].is_some() { he } else { he_twin[he] });
            }
        }

        // Vertex anchors: boundary vertices start their orbit at the exterior halfedge
        let mut vertex_he = vec![usize::MAX; n_vertices];
        let mut outgoing_count = vec![0usize; n_vertices];
        for (he, &tail) in he_tail.iter().enumerate() {
            outgoing_count[tail] += 1;
            if vertex_he[tail] == usize::MAX {
                vertex_he[tail] = he;
            }
        }
        let mut vertex_boundary = vec![false; n_vertices];
        for (&v, &he) in &exterior_from {
            vertex_he[v] = he;
            vertex_boundary[v] = true;
        }

        let mesh = Self {
            faces: faces.to_vec(),
            n_vertices,
            he_next,
            he_twin,
            he_tail,
            he_face,
            he_edge,
            vertex_he,
            vertex_boundary,
            edge_he,
        };

        for v in 0..n_vertices {
            if mesh.vertex_he[v] == usize::MAX {
                return Err(TopologyError::IsolatedVertex(v));
            }
            if mesh.outgoing_halfedges(v).count() != outgoing_count[v] {
                return Err(TopologyError::NonManifoldVertex(v));
            }
        }

        Ok(mesh)
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn n_edges(&self) -> usize {
        self.edge_he.len()
    }

    pub fn n_halfedges(&self) -> usize {
        self.he_tail.len()
    }

    /// Face list in winding order
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn next(&self, he: usize) -> usize {
        self.he_next[he]
    }

    pub fn twin(&self, he: usize) -> usize {
        self.he_twin[he]
    }

    /// Vertex the halfedge points away from
    pub fn tail(&self, he: usize) -> usize {
        self.he_tail[he]
    }

    /// Vertex the halfedge points to
    pub fn tip(&self, he: usize) -> usize {
        self.he_tail[self.he_twin[he]]
    }

    /// Incident face, `None` for exterior halfedges
    pub fn face(&self, he: usize) -> Option<usize> {
        self.he_face[he]
    }

    pub fn edge(&self, he: usize) -> usize {
        self.he_edge[he]
    }

    pub fn is_interior(&self, he: usize) -> bool {
        self.he_face[he].is_some()
    }

    /// An interior halfedge of the edge
    pub fn edge_halfedge(&self, e: usize) -> usize {
        self.edge_he[e]
    }

    /// Tail and tip of the edge's representative halfedge
    pub fn edge_vertices(&self, e: usize) -> (usize, usize) {
        let he = self.edge_he[e];
        (self.tail(he), self.tip(he))
    }

    /// First halfedge of the face
    pub fn face_halfedge(&self, f: usize) -> usize {
        3 * f
    }

    /// Outgoing halfedge the vertex orbit starts from
    pub fn vertex_halfedge(&self, v: usize) -> usize {
        self.vertex_he[v]
    }

    pub fn is_boundary_vertex(&self, v: usize) -> bool {
        self.vertex_boundary[v]
    }

    pub fn is_boundary_edge(&self, e: usize) -> bool {
        let he = self.edge_he[e];
        !self.is_interior(he) || !self.is_interior(self.he_twin[he])
    }

    pub fn has_boundary(&self) -> bool {
        self.vertex_boundary.iter().any(|&b| b)
    }

    /// All outgoing halfedges of `v`, exterior ones included
    pub fn outgoing_halfedges(&self, v: usize) -> Outgoing<'_> {
        let start = self.vertex_he[v];
        Outgoing {
            mesh: self,
            start,
            current: Some(start),
        }
    }

    /// One-ring neighbors of `v`
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.outgoing_halfedges(v).map(move |he| self.tip(he))
    }

    pub fn valence(&self, v: usize) -> usize {
        self.outgoing_halfedges(v).count()
    }

    /// Halfedge from `a` to `b`, if the edge exists
    pub fn find_halfedge(&self, a: usize, b: usize) -> Option<usize> {
        self.outgoing_halfedges(a).find(|&he| self.tip(he) == b)
    }

    /// Number of closed boundary loops
    pub fn n_boundary_loops(&self) -> usize {
        let n_interior = 3 * self.faces.len();
        let mut visited = vec![false; self.n_halfedges() - n_interior];
        let mut loops = 0;
        for start in n_interior..self.n_halfedges() {
            if visited[start - n_interior] {
                continue;
            }
            loops += 1;
            let mut he = start;
            loop {
                visited[he - n_interior] = true;
                he = self.he_next[he];
                if he == start {
                    break;
                }
            }
        }
        loops
    }

    /// V - E + F
    pub fn euler_characteristic(&self) -> i64 {
        self.n_vertices as i64 - self.n_edges() as i64 + self.n_faces() as i64
    }
}

/// Iterator over the outgoing halfedges of a vertex
pub struct Outgoing<'a> {
    mesh: &'a SurfaceMesh,
    start: usize,
    current: Option<usize>,
}

impl Iterator for Outgoing<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let he = self.current?;
        let following = self.mesh.he_next[self.mesh.he_twin[he]];
        self.current = if following == self.start {
            None
        } else {
            Some(following)
        };
        Some(he)
    }
}
