//! Per-vertex fields, index-aligned with the mesh.

use glam::DVec3;

/// Degrees of freedom and material fields carried by every vertex
#[derive(Debug, Clone)]
pub struct VertexFields {
    pub positions: Vec<DVec3>,
    pub velocities: Vec<DVec3>,
    /// Protein density φ ∈ (0, 1)
    pub protein_density: Vec<f64>,
    /// Rate of change of φ chosen by the integrator
    pub protein_velocity: Vec<f64>,
    /// Spontaneous curvature H0(φ)
    pub spontaneous_curvature: Vec<f64>,
    /// Bending modulus Kb(φ)
    pub bending_modulus: Vec<f64>,
    /// Component-wise {0, 1} mask applied to every force
    pub force_mask: Vec<DVec3>,
    /// {0, 1} mask applied to the chemical potential
    pub protein_mask: Vec<f64>,
    /// Marks the tracked point
    pub tracked: Vec<bool>,
    /// Geodesic distance from the tracked point
    pub geodesic_distance: Vec<f64>,
}

impl VertexFields {
    /// Fields at rest with free masks
    pub fn new(positions: Vec<DVec3>, protein_density: Vec<f64>) -> Self {
        let n = positions.len();
        Self {
            positions,
            velocities: vec![DVec3::ZERO; n],
            protein_density,
            protein_velocity: vec![0.0; n],
            spontaneous_curvature: vec![0.0; n],
            bending_modulus: vec![0.0; n],
            force_mask: vec![DVec3::ONE; n],
            protein_mask: vec![1.0; n],
            tracked: vec![false; n],
            geodesic_distance: vec![0.0; n],
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Index of the tracked point, if exactly one is marked
    pub fn tracked_point(&self) -> Option<usize> {
        let mut marked = self.tracked.iter().enumerate().filter(|(_, &t)| t);
        match (marked.next(), marked.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.iter().filter(|&&t| t).count()
    }

    /// Keep only the fields of surviving vertices, in their new order
    pub fn remap(&mut self, vertex_map: &[Option<usize>], n_new: usize) {
        fn gather<T: Copy + Default>(src: &[T], map: &[Option<usize>], n: usize) -> Vec<T> {
            let mut out = vec![T::default(); n];
            for (old, new) in map.iter().enumerate() {
                if let (Some(new), Some(value)) = (new, src.get(old)) {
                    out[*new] = *value;
                }
            }
            out
        }
        self.positions = gather(&self.positions, vertex_map, n_new);
        self.velocities = gather(&self.velocities, vertex_map, n_new);
        self.protein_density = gather(&self.protein_density, vertex_map, n_new);
        self.protein_velocity = gather(&self.protein_velocity, vertex_map, n_new);
        self.spontaneous_curvature = gather(&self.spontaneous_curvature, vertex_map, n_new);
        self.bending_modulus = gather(&self.bending_modulus, vertex_map, n_new);
        self.force_mask = gather(&self.force_mask, vertex_map, n_new);
        self.protein_mask = gather(&self.protein_mask, vertex_map, n_new);
        self.tracked = gather(&self.tracked, vertex_map, n_new);
        self.geodesic_distance = gather(&self.geodesic_distance, vertex_map, n_new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_point_requires_uniqueness() {
        let mut fields = VertexFields::new(vec![DVec3::ZERO; 3], vec![0.5; 3]);
        assert_eq!(fields.tracked_point(), None);
        fields.tracked[1] = true;
        assert_eq!(fields.tracked_point(), Some(1));
        fields.tracked[2] = true;
        assert_eq!(fields.tracked_point(), None);
        assert_eq!(fields.tracked_count(), 2);
    }

    #[test]
    fn test_remap_drops_removed_vertices() {
        let positions = vec![DVec3::X, DVec3::Y, DVec3::Z];
        let mut fields = VertexFields::new(positions, vec![0.1, 0.2, 0.3]);
        fields.remap(&[Some(1), None, Some(0)], 2);
        assert_eq!(fields.positions, vec![DVec3::Z, DVec3::X]);
        assert_eq!(fields.protein_density, vec![0.3, 0.1]);
    }
}
