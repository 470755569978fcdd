//! Energy terms of the membrane free energy.
//!
//! Each term is the primitive of the matching force in `forces.rs`.

use super::MembraneSystem;
use crate::config::OsmoticPolicy;
use crate::state::Energy;

impl MembraneSystem {
    /// Helfrich bending energy Σ Kb A (H − H0)²
    pub fn bending_energy(&self) -> f64 {
        (0..self.n_vertices())
            .map(|v| {
                let area = self.geometry.vertex_dual_areas[v];
                let h = self.geometry.mean_curvature(v);
                let h0 = self.fields.spontaneous_curvature[v];
                self.fields.bending_modulus[v] * area * (h - h0) * (h - h0)
            })
            .sum()
    }

    pub fn surface_energy(&self) -> f64 {
        let tension = &self.parameters.tension;
        let area = self.geometry.surface_area;
        if tension.is_constant || self.mesh.has_boundary() {
            tension.ksg * area
        } else {
            let at = self.reference.target_area;
            let excess = area - at;
            tension.ksg * excess * excess / (2.0 * at) + tension.lambda_sg * excess
        }
    }

    pub fn pressure_energy(&self) -> f64 {
        let osmotic = &self.parameters.osmotic;
        let volume = self.geometry.volume;
        match osmotic.policy {
            OsmoticPolicy::ConstantPressure => -osmotic.kv * volume,
            OsmoticPolicy::PreferredVolume => {
                let target = self.preferred_volume();
                let excess = volume - target;
                osmotic.kv * excess * excess / (2.0 * target) + osmotic.lambda_v * excess
            }
            OsmoticPolicy::IdealGas => {
                let ratio = osmotic.c_am * volume / osmotic.n;
                osmotic.kv * osmotic.n * (ratio - ratio.ln() - 1.0)
            }
        }
    }

    pub fn adsorption_energy(&self) -> f64 {
        let epsilon = self.parameters.adsorption.epsilon;
        self.fields
            .protein_density
            .iter()
            .zip(&self.geometry.vertex_dual_areas)
            .map(|(phi, area)| epsilon * phi * area)
            .sum()
    }

    pub fn aggregation_energy(&self) -> f64 {
        let chi = self.parameters.aggregation.chi;
        self.fields
            .protein_density
            .iter()
            .zip(&self.geometry.vertex_dual_areas)
            .map(|(phi, area)| chi * phi * phi * area)
            .sum()
    }

    /// Line tension energy ½ η Σ_f A_f |∇φ_f|²
    ///
    /// The energy is not gated, but the line tension force only acts on
    /// vertices with 0.1 < φ < 0.9. The force is the exact negative shape
    /// gradient of this energy only while every density lies in that band.
    pub fn dirichlet_energy(&self) -> f64 {
        let eta = self.parameters.dirichlet.eta;
        if eta == 0.0 {
            return 0.0;
        }
        (0..self.mesh.n_faces())
            .map(|f| {
                let gradient = self.geometry.face_gradient(
                    &self.mesh,
                    &self.fields.positions,
                    f,
                    &self.fields.protein_density,
                );
                0.5 * eta * self.geometry.face_areas[f] * gradient.length_squared()
            })
            .sum()
    }

    /// Barrier −λφ Σ (ln φ + ln(1 − φ))
    pub fn interior_penalty_energy(&self) -> f64 {
        let lambda = self.parameters.protein.interior_penalty;
        if lambda == 0.0 {
            return 0.0;
        }
        -lambda
            * self
                .fields
                .protein_density
                .iter()
                .map(|phi| phi.ln() + (1.0 - phi).ln())
                .sum::<f64>()
    }

    /// Kinetic energy with unit vertex mass
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self
            .fields
            .velocities
            .iter()
            .map(|v| v.length_squared())
            .sum::<f64>()
    }

    /// Fill the potential terms of `self.energy`
    pub fn compute_potential_energy(&mut self) -> Energy {
        let bending = self.bending_energy();
        let surface = self.surface_energy();
        let pressure = self.pressure_energy();
        let adsorption = self.adsorption_energy();
        let aggregation = self.aggregation_energy();
        let dirichlet = self.dirichlet_energy();
        let interior_penalty = self.interior_penalty_energy();

        let energy = &mut self.energy;
        energy.bending = bending;
        energy.surface = surface;
        energy.pressure = pressure;
        energy.adsorption = adsorption;
        energy.aggregation = aggregation;
        energy.dirichlet = dirichlet;
        energy.interior_penalty = interior_penalty;
        energy.sum_potential();
        *energy
    }

    /// Fill every term of `self.energy`, including kinetic energy
    pub fn compute_total_energy(&mut self) -> Energy {
        self.energy.kinetic = self.kinetic_energy();
        self.compute_potential_energy()
    }

    /// Accumulate the work done by the external force over `dt`
    pub fn accumulate_external_work(&mut self, dt: f64) {
        let power: f64 = self
            .forces
            .external
            .iter()
            .zip(&self.fields.velocities)
            .map(|(f, v)| f.dot(*v))
            .sum();
        self.energy.external_work += dt * power;
    }

    /// Work the current external force does along `direction` over `alpha`
    pub fn integrated_power(&self, alpha: f64, direction: &[glam::DVec3]) -> f64 {
        alpha
            * self
                .forces
                .external
                .iter()
                .zip(direction)
                .map(|(f, d)| f.dot(*d))
                .sum::<f64>()
    }
}
