//! Overdamped forward Euler.
//!
//! x(t + dt) = x(t) + dt · F(x)
//! φ(t + dt) = φ(t) + dt · M μ(φ)
//!
//! The velocity is the masked mechanical force itself, so the scheme has no
//! inertia and cannot carry a thermostat.

use super::{FailureReason, Integrator, Stepper};
use crate::config::IntegratorOptions;
use crate::error::{ConfigError, Result};
use crate::physics::MembraneSystem;

pub struct Euler {
    core: Integrator,
}

impl Euler {
    pub fn new(system: &mut MembraneSystem, options: IntegratorOptions) -> Result<Self> {
        let dpd = &system.parameters.dpd;
        if dpd.gamma != 0.0 {
            return Err(ConfigError::UnsupportedByScheme {
                scheme: "Euler",
                feature: "DPD damping",
            }
            .into());
        }
        if dpd.temperature != 0.0 {
            return Err(ConfigError::UnsupportedByScheme {
                scheme: "Euler",
                feature: "thermal noise",
            }
            .into());
        }
        Ok(Self {
            core: Integrator::new(system, options)?,
        })
    }
}

impl Stepper for Euler {
    fn name(&self) -> &'static str {
        "Euler"
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

        system.fields.velocities = system.forces.mechanical.clone();
        system.fields.protein_velocity = system
            .forces
            .chemical_potential
            .total
            .iter()
            .map(|mu| mobility * mu)
            .collect();

        let velocities = system.fields.velocities.clone();
        let protein_velocity = system.fields.protein_velocity.clone();
        if self.core.options.is_backtrack {
            let outcome = self
                .core
                .backtrack(system, &velocities, &protein_velocity, dt)?;
            Ok(outcome.alpha)
        } else {
            self.core.advance(system, &velocities, &protein_velocity, dt);
            Ok(dt)
        }
    }
}
