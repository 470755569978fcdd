//! Topology editing arena.
//!
//! `MeshEditor` holds a face list with tombstones and per-vertex incidence
//! lists so that flips, splits and collapses are local operations. Vertices
//! are addressed by generation-checked `VertexKey`s: removing a vertex bumps
//! its generation, so a key held across a collapse is rejected instead of
//! silently aliasing another vertex. `compress` reclaims freed slots and
//! rebuilds a validated `SurfaceMesh`.
//!
//! Reference: Botsch et al., "Polygon Mesh Processing", 2010, ch. 6

use std::collections::HashSet;

use super::SurfaceMesh;
use crate::error::TopologyError;

/// Generation-checked handle to a vertex slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey {
    index: usize,
    generation: u32,
}

impl VertexKey {
    /// Slot index (valid until the next `compress`)
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Editable triangle soup with incidence, convertible back to `SurfaceMesh`
#[derive(Debug, Clone)]
pub struct MeshEditor {
    faces: Vec<Option<[usize; 3]>>,
    vertex_faces: Vec<Vec<usize>>,
    generations: Vec<u32>,
    alive: Vec<bool>,
}

/// Result of `compress`: the rebuilt mesh and the old-to-new vertex map
pub struct Compressed {
    pub mesh: SurfaceMesh,
    pub vertex_map: Vec<Option<usize>>,
}

impl MeshEditor {
    pub fn new(mesh: &SurfaceMesh) -> Self {
        let n = mesh.n_vertices();
        let mut vertex_faces = vec![Vec::new(); n];
        for (f, face) in mesh.faces().iter().enumerate() {
            for &v in face {
                vertex_faces[v].push(f);
            }
        }
        Self {
            faces: mesh.faces().iter().copied().map(Some).collect(),
            vertex_faces,
            generations: vec![0; n],
            alive: vec![true; n],
        }
    }

    /// Number of vertex slots, including removed ones
    pub fn n_vertex_slots(&self) -> usize {
        self.alive.len()
    }

    /// Key of a live vertex slot
    pub fn key(&self, index: usize) -> Option<VertexKey> {
        (index < self.alive.len() && self.alive[index]).then(|| VertexKey {
            index,
            generation: self.generations[index],
        })
    }

    pub fn is_live(&self, key: VertexKey) -> bool {
        key.index < self.alive.len()
            && self.alive[key.index]
            && self.generations[key.index] == key.generation
    }

    fn check(&self, key: VertexKey) -> Result<usize, TopologyError> {
        if self.is_live(key) {
            Ok(key.index)
        } else {
            Err(TopologyError::StaleVertex {
                index: key.index,
                generation: key.generation,
            })
        }
    }

    /// Face containing the directed edge a -> b
    fn directed_face(&self, a: usize, b: usize) -> Option<usize> {
        self.vertex_faces[a].iter().copied().find(|&f| {
            self.faces[f].map_or(false, |face| {
                (0..3).any(|k| face[k] == a && face[(k + 1) % 3] == b)
            })
        })
    }

    fn opposite(&self, f: usize, a: usize, b: usize) -> Option<usize> {
        self.faces[f].and_then(|face| face.iter().copied().find(|&v| v != a && v != b))
    }

    pub fn neighbors(&self, v: usize) -> Vec<usize> {
        let mut ring: Vec<usize> = self.vertex_faces[v]
            .iter()
            .filter_map(|&f| self.faces[f])
            .flat_map(|face| face.into_iter())
            .filter(|&u| u != v)
            .collect();
        ring.sort_unstable();
        ring.dedup();
        ring
    }

    /// Vertices opposite an interior edge: left of a -> b, then right
    pub fn edge_opposites(&self, a: usize, b: usize) -> Option<(usize, usize)> {
        let left = self.opposite(self.directed_face(a, b)?, a, b)?;
        let right = self.opposite(self.directed_face(b, a)?, a, b)?;
        Some((left, right))
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.directed_face(a, b).is_some() || self.directed_face(b, a).is_some()
    }

    /// An edge with a single incident face
    pub fn is_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.directed_face(a, b).is_some() != self.directed_face(b, a).is_some()
    }

    pub fn is_boundary_vertex(&self, v: usize) -> bool {
        self.neighbors(v)
            .into_iter()
            .any(|u| self.is_boundary_edge(v, u))
    }

    /// Faces incident to `v`
    pub fn incident_faces(&self, v: usize) -> Vec<[usize; 3]> {
        self.vertex_faces[v]
            .iter()
            .filter_map(|&f| self.faces[f])
            .collect()
    }

    fn detach(&mut self, v: usize, f: usize) {
        self.vertex_faces[v].retain(|&g| g != f);
    }

    /// Replace the diagonal of the quad around edge (a, b).
    ///
    /// Returns `Ok(false)` when the edge is on the boundary, when the flipped
    /// edge already exists, or when an endpoint would drop below valence 3.
    pub fn flip(&mut self, a: VertexKey, b: VertexKey) -> Result<bool, TopologyError> {
        let a = self.check(a)?;
        let b = self.check(b)?;
        let (f1, f2) = match (self.directed_face(a, b), self.directed_face(b, a)) {
            (Some(f1), Some(f2)) => (f1, f2),
            _ => return Ok(false),
        };
        let (c, d) = match (self.opposite(f1, a, b), self.opposite(f2, a, b)) {
            (Some(c), Some(d)) if c != d => (c, d),
            _ => return Ok(false),
        };
        if self.has_edge(c, d) || self.neighbors(a).len() <= 3 || self.neighbors(b).len() <= 3 {
            return Ok(false);
        }

        // (a, b, c) + (b, a, d) -> (a, d, c) + (d, b, c)
        self.faces[f1] = Some([a, d, c]);
        self.faces[f2] = Some([d, b, c]);
        self.detach(a, f2);
        self.detach(b, f1);
        self.vertex_faces[c].push(f2);
        self.vertex_faces[d].push(f1);
        Ok(true)
    }

    /// Insert a vertex at the midpoint of edge (a, b); returns its key.
    pub fn split(&mut self, a: VertexKey, b: VertexKey) -> Result<Option<VertexKey>, TopologyError> {
        let a = self.check(a)?;
        let b = self.check(b)?;
        let f1 = self.directed_face(a, b);
        let f2 = self.directed_face(b, a);
        if f1.is_none() && f2.is_none() {
            return Ok(None);
        }

        let m = self.alive.len();
        self.alive.push(true);
        self.generations.push(0);
        self.vertex_faces.push(Vec::new());

        if let Some(f1) = f1 {
            if let Some(c) = self.opposite(f1, a, b) {
                // (a, b, c) -> (a, m, c) + (m, b, c)
                let g = self.faces.len();
                self.faces[f1] = Some([a, m, c]);
                self.faces.push(Some([m, b, c]));
                self.detach(b, f1);
                self.vertex_faces[b].push(g);
                self.vertex_faces[c].push(g);
                self.vertex_faces[m].extend([f1, g]);
            }
        }
        if let Some(f2) = f2 {
            if let Some(d) = self.opposite(f2, a, b) {
                // (b, a, d) -> (b, m, d) + (m, a, d)
                let g = self.faces.len();
                self.faces[f2] = Some([b, m, d]);
                self.faces.push(Some([m, a, d]));
                self.detach(a, f2);
                self.vertex_faces[a].push(g);
                self.vertex_faces[d].push(g);
                self.vertex_faces[m].extend([f2, g]);
            }
        }

        Ok(self.key(m))
    }

    /// Whether collapsing (a, b) keeps the surface manifold.
    ///
    /// Link condition: the common neighbors of a and b are exactly the
    /// vertices opposite the edge. Interior edges joining two boundary
    /// vertices would pinch the surface and are rejected.
    pub fn can_collapse(&self, a: usize, b: usize) -> bool {
        let f1 = self.directed_face(a, b);
        let f2 = self.directed_face(b, a);
        if f1.is_none() && f2.is_none() {
            return false;
        }
        let mut opposite = HashSet::new();
        for f in [f1, f2].into_iter().flatten() {
            if let Some(c) = self.opposite(f, a, b) {
                opposite.insert(c);
            }
        }
        let ring_a: HashSet<usize> = self.neighbors(a).into_iter().collect();
        let common: HashSet<usize> = self
            .neighbors(b)
            .into_iter()
            .filter(|u| ring_a.contains(u))
            .collect();
        if common != opposite {
            return false;
        }
        let interior_edge = f1.is_some() && f2.is_some();
        if interior_edge && self.is_boundary_vertex(a) && self.is_boundary_vertex(b) {
            return false;
        }
        // Keep at least a tetrahedron (closed) or a single triangle (open)
        let live_faces = self.faces.iter().filter(|f| f.is_some()).count();
        live_faces > if interior_edge { 4 } else { 1 }
    }

    /// Merge `remove` into `keep`; returns the surviving key.
    pub fn collapse(
        &mut self,
        keep: VertexKey,
        remove: VertexKey,
    ) -> Result<Option<VertexKey>, TopologyError> {
        let a = self.check(keep)?;
        let b = self.check(remove)?;
        if !self.can_collapse(a, b) {
            return Ok(None);
        }

        for f in [self.directed_face(a, b), self.directed_face(b, a)]
            .into_iter()
            .flatten()
        {
            if let Some(face) = self.faces[f].take() {
                for v in face {
                    self.detach(v, f);
                }
            }
        }

        for f in std::mem::take(&mut self.vertex_faces[b]) {
            if let Some(face) = self.faces[f].as_mut() {
                for v in face.iter_mut() {
                    if *v == b {
                        *v = a;
                    }
                }
                self.vertex_faces[a].push(f);
            }
        }

        self.alive[b] = false;
        self.generations[b] = self.generations[b].wrapping_add(1);
        Ok(Some(keep))
    }

    /// Reclaim freed slots and rebuild validated connectivity
    pub fn compress(&self) -> Result<Compressed, TopologyError> {
        let mut vertex_map = vec![None; self.alive.len()];
        let mut next = 0;
        for (v, &alive) in self.alive.iter().enumerate() {
            if alive {
                vertex_map[v] = Some(next);
                next += 1;
            }
        }

        let mut faces = Vec::with_capacity(self.faces.len());
        for face in self.faces.iter().flatten() {
            let mut mapped = [0; 3];
            for (k, &v) in face.iter().enumerate() {
                mapped[k] = vertex_map[v].ok_or(TopologyError::StaleVertex {
                    index: v,
                    generation: self.generations[v],
                })?;
            }
            faces.push(mapped);
        }

        let mesh = SurfaceMesh::from_faces(next, &faces)?;
        Ok(Compressed { mesh, vertex_map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::primitives;

    fn icosphere_editor() -> (SurfaceMesh, MeshEditor) {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let editor = MeshEditor::new(&mesh);
        (mesh, editor)
    }

    #[test]
    fn test_flip_preserves_counts() {
        let (mesh, mut editor) = icosphere_editor();
        let (a, b) = mesh.edge_vertices(0);
        let flipped = editor
            .flip(editor.key(a).unwrap(), editor.key(b).unwrap())
            .unwrap();
        assert!(flipped);
        assert!(!editor.has_edge(a, b));

        let compressed = editor.compress().unwrap();
        assert_eq!(compressed.mesh.n_vertices(), mesh.n_vertices());
        assert_eq!(compressed.mesh.n_edges(), mesh.n_edges());
        assert_eq!(compressed.mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_split_adds_vertex() {
        let (mesh, mut editor) = icosphere_editor();
        let (a, b) = mesh.edge_vertices(3);
        let m = editor
            .split(editor.key(a).unwrap(), editor.key(b).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(m.index(), mesh.n_vertices());
        assert_eq!(editor.neighbors(m.index()).len(), 4);

        let compressed = editor.compress().unwrap();
        assert_eq!(compressed.mesh.n_vertices(), mesh.n_vertices() + 1);
        assert_eq!(compressed.mesh.n_faces(), mesh.n_faces() + 2);
        assert_eq!(compressed.mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_collapse_invalidates_key() {
        let (mesh, mut editor) = icosphere_editor();
        let (a, b) = mesh.edge_vertices(5);
        let ka = editor.key(a).unwrap();
        let kb = editor.key(b).unwrap();
        let survivor = editor.collapse(ka, kb).unwrap().unwrap();
        assert_eq!(survivor, ka);
        assert!(!editor.is_live(kb));
        assert!(matches!(
            editor.flip(kb, ka),
            Err(TopologyError::StaleVertex { .. })
        ));

        let compressed = editor.compress().unwrap();
        assert_eq!(compressed.mesh.n_vertices(), mesh.n_vertices() - 1);
        assert_eq!(compressed.mesh.n_faces(), mesh.n_faces() - 2);
        assert_eq!(compressed.vertex_map[b], None);
        assert_eq!(compressed.mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_boundary_split_and_collapse() {
        let (faces, positions) = primitives::hexagon(1.0, 1);
        let mesh = SurfaceMesh::from_faces(positions.len(), &faces).unwrap();
        let mut editor = MeshEditor::new(&mesh);

        let e = (0..mesh.n_edges()).find(|&e| mesh.is_boundary_edge(e)).unwrap();
        let (a, b) = mesh.edge_vertices(e);
        let m = editor
            .split(editor.key(a).unwrap(), editor.key(b).unwrap())
            .unwrap()
            .unwrap();
        assert!(editor.is_boundary_vertex(m.index()));

        // Collapse the new boundary vertex back into an endpoint
        let survivor = editor.collapse(editor.key(a).unwrap(), m).unwrap();
        assert!(survivor.is_some());
        let compressed = editor.compress().unwrap();
        assert_eq!(compressed.mesh.n_vertices(), mesh.n_vertices());
        assert_eq!(compressed.mesh.euler_characteristic(), 1);
    }

    #[test]
    fn test_link_condition_rejects_pinch() {
        // Tetrahedron: every collapse would produce a degenerate surface
        let faces = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        let mesh = SurfaceMesh::from_faces(4, &faces).unwrap();
        let mut editor = MeshEditor::new(&mesh);
        let result = editor
            .collapse(editor.key(0).unwrap(), editor.key(1).unwrap())
            .unwrap();
        assert!(result.is_none());
    }
}
