//! Time integration of the membrane system.
//!
//! `Integrator` holds what every scheme shares: step-size control, the
//! Armijo line search, constraint multiplier updates, the finiteness sweep
//! and the exit flag. Each scheme implements `Stepper::march` and inherits
//! the run loop from `Stepper::integrate`.
//!
//! Run loop, per iteration:
//! 1. status: evaluate forces and energy, test convergence and finiteness
//! 2. save a frame every `save_period` steps and on termination
//! 3. march one step
//! 4. regularize, mutate and refresh geodesics on their periods

mod conjugate_gradient;
mod euler;
mod velocity_verlet;

pub use conjugate_gradient::ConjugateGradient;
pub use euler::Euler;
pub use velocity_verlet::VelocityVerlet;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::DVec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use super::MembraneSystem;
use crate::config::{ConstraintPolicy, IntegrationScheme, IntegratorOptions, OsmoticPolicy};
use crate::error::{ConfigError, Result};
use crate::export::FrameSink;

/// Smallest accepted step, relative to the initial trial step
const MIN_STEP_FRACTION: f64 = 1e-5;
/// Growth factor of penalty moduli under `IncrementalPenalty`
const PENALTY_GROWTH: f64 = 1.3;

/// Why a run stopped unsuccessfully
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("non-finite values in {0:?}")]
    NonFinite(Vec<&'static str>),

    #[error("line search failed to reduce energy; increased: {increased:?}")]
    LineSearch { increased: Vec<&'static str> },

    #[error("simulation time exceeded the total time")]
    TimeBudget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntegratorStatus {
    Running,
    Converged,
    Failed(FailureReason),
    /// Stopped by the exit flag
    Exited,
}

/// Accepted step of a backtracking line search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchOutcome {
    pub alpha: f64,
    /// The supplied direction was uphill and the raw force was used instead
    pub used_raw_gradient: bool,
}

/// Final state of `Stepper::integrate`
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub status: IntegratorStatus,
    pub steps: usize,
    pub frames: usize,
    pub time: f64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == IntegratorStatus::Converged
    }
}

/// Shared integrator state
pub struct Integrator {
    pub options: IntegratorOptions,
    /// Characteristic step dt0
    time_step: f64,
    /// dt0 over the squared initial minimum edge length
    dt_size2_ratio: f64,
    /// Largest mechanical force magnitude of the initial configuration
    initial_max_force: f64,
    /// Step taken by the last `march`
    last_step: f64,
    mechanical_norm: f64,
    chemical_norm: f64,
    area_residual: f64,
    volume_residual: f64,
    exit: Arc<AtomicBool>,
    rng: StdRng,
    step: usize,
    frame: usize,
}

impl Integrator {
    /// Validate `options` against `system` and capture step-size references
    pub fn new(system: &mut MembraneSystem, options: IntegratorOptions) -> Result<Self> {
        options.validate()?;
        if system.parameters.regularizer.kst != 0.0
            && options.process_mesh_period > 0
            && options.mutator.changes_topology()
        {
            return Err(ConfigError::Incompatible(
                "conformal regularization cannot be combined with topology-changing mesh mutation"
                    .to_string(),
            )
            .into());
        }

        let min_edge = system.geometry.min_edge_length();
        system.compute_conservative_forcing();
        let initial_max_force = max_magnitude(&system.forces.mechanical);

        Ok(Self {
            time_step: options.time_step,
            dt_size2_ratio: options.time_step / (min_edge * min_edge),
            initial_max_force,
            last_step: 0.0,
            mechanical_norm: 0.0,
            chemical_norm: 0.0,
            area_residual: 0.0,
            volume_residual: 0.0,
            exit: Arc::new(AtomicBool::new(false)),
            rng: StdRng::seed_from_u64(options.seed),
            step: 0,
            frame: 0,
            options,
        })
    }

    /// Handle that stops the run when set
    pub fn exit_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exit)
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn mechanical_norm(&self) -> f64 {
        self.mechanical_norm
    }

    pub fn chemical_norm(&self) -> f64 {
        self.chemical_norm
    }

    /// Step size for the current configuration.
    ///
    /// Adaptive steps scale with the squared minimum edge length and
    /// inversely with the largest force.
    pub fn characteristic_step(&self, system: &MembraneSystem) -> f64 {
        if !self.options.is_adaptive_step {
            return self.time_step;
        }
        let max_force = max_magnitude(&system.forces.mechanical);
        if max_force > 0.0 && self.initial_max_force > 0.0 {
            let min_edge = system.geometry.min_edge_length();
            self.dt_size2_ratio * min_edge * min_edge * self.initial_max_force / max_force
        } else {
            self.time_step
        }
    }

    /// Evaluate forces and energy, then decide whether the run continues
    pub fn status(&mut self, system: &mut MembraneSystem) -> IntegratorStatus {
        // Work of the external force that drove the previous step
        if self.last_step > 0.0 {
            system.accumulate_external_work(self.last_step);
        }
        let dt = self.characteristic_step(system);
        system.compute_physical_forcing(&mut self.rng, dt);
        system.compute_total_energy();

        let non_finite = non_finite_components(system);
        if !non_finite.is_empty() {
            log::error!("Non-finite values at step {}: {:?}", self.step, non_finite);
            return IntegratorStatus::Failed(FailureReason::NonFinite(non_finite));
        }

        self.mechanical_norm = system.mechanical_norm();
        self.chemical_norm = system.chemical_norm();
        self.area_residual = area_residual(system);
        self.volume_residual = volume_residual(system);

        let tolerance = self.options.tolerance;
        let forces_vanish = self.mechanical_norm < tolerance && self.chemical_norm < tolerance;
        if forces_vanish {
            let constraint_tolerance = self.options.constraint_tolerance;
            if self.area_residual < constraint_tolerance
                && self.volume_residual < constraint_tolerance
            {
                log::info!(
                    "Converged at step {} (t = {:.4}): |F| = {:.3e}, |μ| = {:.3e}",
                    self.step,
                    system.time,
                    self.mechanical_norm,
                    self.chemical_norm
                );
                return IntegratorStatus::Converged;
            }
            self.update_constraints(system);
        }

        if system.time > self.options.total_time {
            log::warn!(
                "Time budget of {} exhausted at step {}",
                self.options.total_time,
                self.step
            );
            return IntegratorStatus::Failed(FailureReason::TimeBudget);
        }
        IntegratorStatus::Running
    }

    /// Tighten unmet area and volume constraints
    fn update_constraints(&self, system: &mut MembraneSystem) {
        let tolerance = self.options.constraint_tolerance;
        let area = system.geometry.surface_area;
        let volume = system.geometry.volume;
        let target_area = system.reference.target_area;
        let preferred_volume = system.preferred_volume();
        let params = &mut system.parameters;

        let area_unmet = self.area_residual >= tolerance;
        let volume_unmet = self.volume_residual >= tolerance;
        match self.options.constraint_policy {
            ConstraintPolicy::AugmentedLagrangian => {
                if area_unmet {
                    params.tension.lambda_sg +=
                        params.tension.ksg * (area - target_area) / target_area;
                }
                if volume_unmet && params.osmotic.policy == OsmoticPolicy::PreferredVolume {
                    params.osmotic.lambda_v +=
                        params.osmotic.kv * (volume - preferred_volume) / preferred_volume;
                }
                log::info!(
                    "Multipliers updated: λ_SG = {:.4e}, λ_V = {:.4e}",
                    params.tension.lambda_sg,
                    params.osmotic.lambda_v
                );
            }
            ConstraintPolicy::IncrementalPenalty => {
                if area_unmet {
                    params.tension.ksg *= PENALTY_GROWTH;
                }
                if volume_unmet {
                    params.osmotic.kv *= PENALTY_GROWTH;
                }
                log::info!(
                    "Penalties increased: Ksg = {:.4e}, Kv = {:.4e}",
                    params.tension.ksg,
                    params.osmotic.kv
                );
            }
        }
    }

    /// Backtracking line search from the current configuration.
    ///
    /// Moves positions along `direction` and protein density along
    /// `protein_direction`, shrinking the trial step by ρ until the Armijo
    /// condition holds. An uphill direction is replaced by the raw force and
    /// mobility-scaled chemical potential. When the step underflows, the
    /// state at entry is restored.
    pub fn backtrack(
        &mut self,
        system: &mut MembraneSystem,
        direction: &[DVec3],
        protein_direction: &[f64],
        initial_step: f64,
    ) -> std::result::Result<LineSearchOutcome, FailureReason> {
        let positions = system.fields.positions.clone();
        let density = system.fields.protein_density.clone();
        let time = system.time;
        let energy = system.energy;

        let mut direction = direction.to_vec();
        let mut protein_direction = protein_direction.to_vec();
        let mut projection = descent_projection(system, &direction, &protein_direction);
        let mut used_raw_gradient = false;
        if projection <= 0.0 {
            log::warn!("Search direction is uphill, falling back to the raw force");
            direction = system.forces.mechanical.clone();
            protein_direction = raw_protein_direction(system);
            projection = descent_projection(system, &direction, &protein_direction);
            used_raw_gradient = true;
        }

        let rho = self.options.rho;
        let c1 = self.options.c1;
        let mut alpha = initial_step;
        loop {
            for (x, (x0, d)) in system
                .fields
                .positions
                .iter_mut()
                .zip(positions.iter().zip(&direction))
            {
                *x = *x0 + alpha * *d;
            }
            for (phi, (phi0, d)) in system
                .fields
                .protein_density
                .iter_mut()
                .zip(density.iter().zip(&protein_direction))
            {
                *phi = phi0 + alpha * d;
            }
            system.time = time + alpha;
            system.update_configuration();
            let trial = system.compute_potential_energy().potential;
            let allowance = system.integrated_power(alpha, &direction);

            if trial < energy.potential + allowance - c1 * alpha * projection {
                return Ok(LineSearchOutcome {
                    alpha,
                    used_raw_gradient,
                });
            }

            if alpha < MIN_STEP_FRACTION * initial_step {
                let increased = system.energy.increased_since(&energy);
                system.fields.positions = positions;
                system.fields.protein_density = density;
                system.time = time;
                system.update_configuration();
                system.energy = energy;
                log::error!(
                    "Line search failed at step {} (α = {:.3e}); increased: {:?}",
                    self.step,
                    alpha,
                    increased
                );
                return Err(FailureReason::LineSearch { increased });
            }
            alpha *= rho;
        }
    }

    /// Move along `direction` by a fixed `dt`
    fn advance(
        &self,
        system: &mut MembraneSystem,
        direction: &[DVec3],
        protein_direction: &[f64],
        dt: f64,
    ) {
        for (x, d) in system.fields.positions.iter_mut().zip(direction) {
            *x += dt * *d;
        }
        for (phi, d) in system.fields.protein_density.iter_mut().zip(protein_direction) {
            *phi += dt * d;
        }
        system.time += dt;
        system.update_configuration();
    }

    fn save(&mut self, system: &MembraneSystem, sink: &mut dyn FrameSink) -> Result<()> {
        let record = system.frame_record(self.frame, self.mechanical_norm, self.chemical_norm);
        sink.write_frame(&record)?;
        log::debug!(
            "Frame {} saved at t = {:.4}: E = {:.6e}, |F| = {:.3e}",
            self.frame,
            system.time,
            system.energy.total,
            self.mechanical_norm
        );
        self.frame += 1;
        Ok(())
    }
}

/// Σ F·d + Σ μ·dφ, positive for a descent direction
fn descent_projection(system: &MembraneSystem, direction: &[DVec3], protein_direction: &[f64]) -> f64 {
    let mechanical: f64 = system
        .forces
        .mechanical
        .iter()
        .zip(direction)
        .map(|(f, d)| f.dot(*d))
        .sum();
    let chemical: f64 = system
        .forces
        .chemical_potential
        .total
        .iter()
        .zip(protein_direction)
        .map(|(mu, d)| mu * d)
        .sum();
    mechanical + chemical
}

/// Protein velocity M·μ
fn raw_protein_direction(system: &MembraneSystem) -> Vec<f64> {
    let mobility = system.parameters.protein.mobility;
    system
        .forces
        .chemical_potential
        .total
        .iter()
        .map(|mu| mobility * mu)
        .collect()
}

fn max_magnitude(field: &[DVec3]) -> f64 {
    field.iter().fold(0.0, |m, f| m.max(f.length()))
}

/// Relative distance from the target area; zero when area is unconstrained
fn area_residual(system: &MembraneSystem) -> f64 {
    let tension = &system.parameters.tension;
    if tension.is_constant || system.mesh.has_boundary() {
        return 0.0;
    }
    (system.geometry.surface_area / system.reference.target_area - 1.0).abs()
}

/// Relative distance from the volume target of the osmotic policy
fn volume_residual(system: &MembraneSystem) -> f64 {
    let osmotic = &system.parameters.osmotic;
    if osmotic.kv == 0.0 {
        return 0.0;
    }
    let volume = system.geometry.volume;
    match osmotic.policy {
        OsmoticPolicy::ConstantPressure => 0.0,
        OsmoticPolicy::PreferredVolume => (volume / system.preferred_volume() - 1.0).abs(),
        OsmoticPolicy::IdealGas => (osmotic.n / (volume * osmotic.c_am) - 1.0).abs(),
    }
}

/// Names of every force, potential or energy term holding a non-finite value
fn non_finite_components(system: &MembraneSystem) -> Vec<&'static str> {
    let mut names = Vec::new();
    if system.fields.positions.iter().any(|x| !x.is_finite()) {
        names.push("positions");
    }
    if system.fields.protein_density.iter().any(|phi| !phi.is_finite()) {
        names.push("protein density");
    }
    for (name, field) in system.forces.vector_fields() {
        if field.iter().any(|f| !f.is_finite()) {
            names.push(name);
        }
    }
    for (name, field) in system.forces.scalar_fields() {
        if field.iter().any(|v| !v.is_finite()) {
            names.push(name);
        }
    }
    for (name, value) in system.energy.components() {
        if !value.is_finite() {
            names.push(name);
        }
    }
    names
}

/// A time stepping scheme driven by the shared run loop
pub trait Stepper {
    fn name(&self) -> &'static str;

    fn core(&self) -> &Integrator;

    fn core_mut(&mut self) -> &mut Integrator;

    /// Advance one step from the forces `status` just evaluated; returns
    /// the step size taken
    fn march(&mut self, system: &mut MembraneSystem) -> std::result::Result<f64, FailureReason>;

    /// Called after a mesh mutation changed the connectivity
    fn on_topology_change(&mut self, _system: &MembraneSystem) {}

    /// Run until convergence, failure, time budget or exit request
    fn integrate(
        &mut self,
        system: &mut MembraneSystem,
        sink: &mut dyn FrameSink,
    ) -> Result<RunSummary> {
        log::info!(
            "Integrating with {} (dt = {}, T = {})",
            self.name(),
            self.core().options.time_step,
            self.core().options.total_time
        );

        let status = loop {
            if self.core().exit.load(Ordering::Relaxed) {
                log::info!("Exit requested at step {}", self.core().step);
                self.core_mut().save(system, sink)?;
                break IntegratorStatus::Exited;
            }

            let status = self.core_mut().status(system);
            let step = self.core().step;
            if status != IntegratorStatus::Running || step % self.core().options.save_period == 0 {
                self.core_mut().save(system, sink)?;
            }
            if status != IntegratorStatus::Running {
                break status;
            }

            match self.march(system) {
                Ok(dt) => self.core_mut().last_step = dt,
                Err(reason) => {
                    self.core_mut().save(system, sink)?;
                    break IntegratorStatus::Failed(reason);
                }
            }
            self.core_mut().step += 1;
            let step = self.core().step;

            if system.parameters.regularizer.is_active() {
                system.apply_regularization();
                system.update_configuration();
            }

            let options = &self.core().options;
            let mutate = options.process_mesh_period > 0
                && options.mutator.is_enabled()
                && step % options.process_mesh_period == 0;
            let refresh = options.update_geodesics_period > 0
                && step % options.update_geodesics_period == 0;
            if mutate {
                let mutator = options.mutator.clone();
                if system.mutate_mesh(&mutator)? {
                    self.on_topology_change(system);
                }
            }
            if refresh {
                system.update_geodesics();
                system.compute_external_force();
            }
        };

        let summary = RunSummary {
            status,
            steps: self.core().step,
            frames: self.core().frame,
            time: system.time,
        };
        log::info!(
            "{} finished after {} steps at t = {:.4}: {:?}",
            self.name(),
            summary.steps,
            summary.time,
            summary.status
        );
        Ok(summary)
    }
}

/// Build the stepper selected by `options.scheme`
pub fn build(
    system: &mut MembraneSystem,
    options: IntegratorOptions,
) -> Result<Box<dyn Stepper>> {
    Ok(match options.scheme {
        IntegrationScheme::Euler => Box::new(Euler::new(system, options)?),
        IntegrationScheme::VelocityVerlet => Box::new(VelocityVerlet::new(system, options)?),
        IntegrationScheme::ConjugateGradient => Box::new(ConjugateGradient::new(system, options)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::geometry::primitives;

    fn system() -> MembraneSystem {
        system_with(Parameters::default())
    }

    fn system_with(params: Parameters) -> MembraneSystem {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        MembraneSystem::new(&faces, positions, params, None).unwrap()
    }

    /// Moduli off so a round sphere sits at rest
    fn at_rest() -> Parameters {
        let mut params = Parameters::default();
        params.bending.kb = 0.0;
        params.protein.interior_penalty = 0.0;
        params
    }

    #[test]
    fn test_rejects_conformal_regularization_with_remeshing() {
        let mut system = system();
        system.parameters.regularizer.kst = 0.1;
        let mut options = IntegratorOptions::default();
        options.process_mesh_period = 10;
        options.mutator.split_long = true;
        assert!(matches!(
            Integrator::new(&mut system, options),
            Err(crate::SimulationError::Config(ConfigError::Incompatible(_)))
        ));
    }

    #[test]
    fn test_adaptive_step_matches_initial_step() {
        let mut params = Parameters::default();
        params.bending.kb = 1.0;
        let mut system = system_with(params);
        let options = IntegratorOptions {
            is_adaptive_step: true,
            ..Default::default()
        };
        let integrator = Integrator::new(&mut system, options).unwrap();
        // Unchanged configuration reproduces dt0
        let dt = integrator.characteristic_step(&system);
        assert!((dt - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_status_at_rest_is_converged() {
        let mut system = system_with(at_rest());
        let mut integrator = Integrator::new(&mut system, IntegratorOptions::default()).unwrap();
        assert_eq!(integrator.status(&mut system), IntegratorStatus::Converged);
    }

    #[test]
    fn test_status_sees_bending_edit_after_refresh() {
        let mut system = system_with(at_rest());
        system.parameters.bending.kb = 1.0;
        system.update_configuration();
        let mut integrator = Integrator::new(&mut system, IntegratorOptions::default()).unwrap();
        assert!(system.fields.bending_modulus.iter().all(|&kb| kb == 1.0));
        integrator.status(&mut system);
        assert!(system.energy.bending > 0.0);
    }

    #[test]
    fn test_status_flags_non_finite_positions() {
        let mut system = system();
        let mut integrator = Integrator::new(&mut system, IntegratorOptions::default()).unwrap();
        system.fields.positions[0].x = f64::NAN;
        system.update_configuration();
        match integrator.status(&mut system) {
            IntegratorStatus::Failed(FailureReason::NonFinite(names)) => {
                assert!(names.contains(&"positions"));
            }
            other => panic!("expected non-finite failure, got {:?}", other),
        }
    }

    #[test]
    fn test_time_budget() {
        let mut system = system();
        let options = IntegratorOptions {
            total_time: 1.0,
            ..Default::default()
        };
        let mut integrator = Integrator::new(&mut system, options).unwrap();
        system.time = 2.0;
        assert_eq!(
            integrator.status(&mut system),
            IntegratorStatus::Failed(FailureReason::TimeBudget)
        );
    }

    #[test]
    fn test_augmented_lagrangian_updates_multiplier() {
        let mut system = system_with(at_rest());
        system.reference.target_area *= 0.9;
        let options = IntegratorOptions {
            tolerance: 1e3,
            ..Default::default()
        };
        let mut integrator = Integrator::new(&mut system, options).unwrap();
        assert_eq!(integrator.status(&mut system), IntegratorStatus::Running);
        assert!(system.parameters.tension.lambda_sg > 0.0);
    }

    #[test]
    fn test_incremental_penalty_grows_modulus() {
        let mut system = system_with(at_rest());
        system.reference.target_area *= 0.9;
        let ksg = system.parameters.tension.ksg;
        let options = IntegratorOptions {
            tolerance: 1e3,
            constraint_policy: ConstraintPolicy::IncrementalPenalty,
            ..Default::default()
        };
        let mut integrator = Integrator::new(&mut system, options).unwrap();
        integrator.status(&mut system);
        assert!((system.parameters.tension.ksg - PENALTY_GROWTH * ksg).abs() < 1e-15);
    }
}
