//! Velocity-Verlet integration with the DPD thermostat.
//!
//! Standard Velocity-Verlet algorithm, unit vertex mass:
//! 1. v(t + dt/2) = v(t) + (dt/2) * F(t)
//! 2. x(t + dt) = x(t) + dt * v(t + dt/2)
//! 3. compute forces at new positions
//! 4. v(t + dt) = v(t + dt/2) + (dt/2) * F(t + dt)
//!
//! F is the sum of the conservative, damping and stochastic forces. Protein
//! density follows a forward Euler update from the chemical potential at t.
//!
//! Reference: Swope et al., J Chem Phys 1982

use glam::DVec3;

use super::{FailureReason, Integrator, Stepper};
use crate::config::IntegratorOptions;
use crate::error::{ConfigError, Result};
use crate::physics::MembraneSystem;

pub struct VelocityVerlet {
    core: Integrator,
}

impl VelocityVerlet {
    pub fn new(system: &mut MembraneSystem, options: IntegratorOptions) -> Result<Self> {
        if options.is_backtrack {
            return Err(ConfigError::UnsupportedByScheme {
                scheme: "velocity Verlet",
                feature: "backtracking line search",
            }
            .into());
        }
        Ok(Self {
            core: Integrator::new(system, options)?,
        })
    }

    /// v += (dt/2) F
    pub fn half_step_velocity(velocities: &mut [DVec3], forces: &[DVec3], dt: f64) {
        let half_dt = dt / 2.0;
        for (vel, force) in velocities.iter_mut().zip(forces) {
            *vel += *force * half_dt;
        }
    }

    /// x + dt v
    pub fn step_position(positions: &[DVec3], velocities: &[DVec3], dt: f64) -> Vec<DVec3> {
        positions
            .iter()
            .zip(velocities)
            .map(|(pos, vel)| *pos + *vel * dt)
            .collect()
    }
}

impl Stepper for VelocityVerlet {
    fn name(&self) -> &'static str {
        "velocity Verlet"
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

        system.fields.protein_velocity = system
            .forces
            .chemical_potential
            .total
            .iter()
            .map(|mu| mobility * mu)
            .collect();
        for (phi, v) in system
            .fields
            .protein_density
            .iter_mut()
            .zip(&system.fields.protein_velocity)
        {
            *phi += dt * v;
        }

        let force = system.forces.total_mechanical();
        Self::half_step_velocity(&mut system.fields.velocities, &force, dt);
        system.fields.positions =
            Self::step_position(&system.fields.positions, &system.fields.velocities, dt);
        system.time += dt;
        system.update_configuration();

        system.compute_physical_forcing(self.core.rng_mut(), dt);
        let force = system.forces.total_mechanical();
        Self::half_step_velocity(&mut system.fields.velocities, &force, dt);
        Ok(dt)
    }
}
