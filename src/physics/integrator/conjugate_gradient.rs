//! Fletcher–Reeves nonlinear conjugate gradient.
//!
//! d_k = F_k + β_k d_{k−1},  β_k = ‖F_k‖² / ‖F_{k−1}‖²
//!
//! Positions and protein density share one search direction. The direction
//! resets to the raw force every `restart_period` steps and after a mesh
//! mutation. Every step is a backtracking line search.

use glam::DVec3;

use super::{FailureReason, Integrator, Stepper};
use crate::config::IntegratorOptions;
use crate::error::{ConfigError, Result};
use crate::physics::MembraneSystem;

pub struct ConjugateGradient {
    core: Integrator,
    direction: Vec<DVec3>,
    protein_direction: Vec<f64>,
    /// ‖F‖² of the previous step; zero forces a restart
    previous_norm2: f64,
    since_restart: usize,
}

impl ConjugateGradient {
    pub fn new(system: &mut MembraneSystem, mut options: IntegratorOptions) -> Result<Self> {
        let dpd = &system.parameters.dpd;
        if dpd.gamma != 0.0 || dpd.temperature != 0.0 {
            return Err(ConfigError::UnsupportedByScheme {
                scheme: "conjugate gradient",
                feature: "the DPD thermostat",
            }
            .into());
        }
        if !options.is_backtrack {
            log::warn!("Conjugate gradient always backtracks, enabling line search");
            options.is_backtrack = true;
        }
        Ok(Self {
            core: Integrator::new(system, options)?,
            direction: Vec::new(),
            protein_direction: Vec::new(),
            previous_norm2: 0.0,
            since_restart: 0,
        })
    }

    fn restart(&mut self) {
        self.direction.clear();
        self.protein_direction.clear();
        self.previous_norm2 = 0.0;
        self.since_restart = 0;
    }
}

impl Stepper for ConjugateGradient {
    fn name(&self) -> &'static str {
        "conjugate gradient"
    }

    fn core(&self) -> &Integrator {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Integrator {
        &mut self.core
    }

    fn march(&mut self, system: &mut MembraneSystem) -> std::result::Result<f64, FailureReason> {
        let dt = self.core.characteristic_step(system);
        let mobility = system.parameters.protein.mobility;
        let force = system.forces.mechanical.clone();
        let protein_force: Vec<f64> = system
            .forces
            .chemical_potential
            .total
            .iter()
            .map(|mu| mobility * mu)
            .collect();
        let norm2 = force.iter().map(|f| f.length_squared()).sum::<f64>()
            + protein_force.iter().map(|m| m * m).sum::<f64>();

        let period = self.core.options.restart_period.max(1);
        let stale = self.direction.len() != force.len()
            || self.protein_direction.len() != protein_force.len();
        if stale || self.previous_norm2 == 0.0 || self.since_restart % period == 0 {
            self.direction = force;
            self.protein_direction = protein_force;
            self.since_restart = 0;
        } else {
            let beta = norm2 / self.previous_norm2;
            for (d, f) in self.direction.iter_mut().zip(&force) {
                *d = *f + beta * *d;
            }
            for (d, f) in self.protein_direction.iter_mut().zip(&protein_force) {
                *d = f + beta * *d;
            }
        }
        self.previous_norm2 = norm2;
        self.since_restart += 1;

        let direction = self.direction.clone();
        let protein_direction = self.protein_direction.clone();
        let outcome = self
            .core
            .backtrack(system, &direction, &protein_direction, dt)?;
        if outcome.used_raw_gradient {
            log::debug!("Conjugate direction was uphill, restarting");
            self.restart();
        }

        system.fields.velocities = direction;
        system.fields.protein_velocity = protein_direction;
        Ok(outcome.alpha)
    }

    fn on_topology_change(&mut self, _system: &MembraneSystem) {
        self.restart();
    }
}
