//! Membrane Simulator X - Entry point
//!
//! CLI Usage:
//!   cargo run                              # Relax an icosphere with default settings
//!   cargo run -- --diagnose                # Print forces and energies, no time stepping
//!   cargo run -- -p params.json -o options.json -s 3 --out exports

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use membrane_simulator_x::{
    config::{IntegratorOptions, Parameters},
    export::{export_frame_json, CsvExporter, FrameSink, JsonFrameWriter},
    geometry::primitives,
    physics::{integrator, MembraneSystem},
    FrameRecord, Stepper,
};

/// Command line settings
struct CliArgs {
    diagnose: bool,
    parameters: PathBuf,
    options: PathBuf,
    subdivisions: usize,
    output: PathBuf,
}

/// CSV time series plus one JSON file per saved frame
struct Outputs {
    csv: CsvExporter,
    json: JsonFrameWriter,
}

impl FrameSink for Outputs {
    fn write_frame(&mut self, record: &FrameRecord) -> Result<()> {
        self.csv.record(record)?;
        self.json.write_frame(record)
    }
}

fn build_system(args: &CliArgs) -> Result<MembraneSystem> {
    let params = Parameters::load_or_default(&args.parameters);
    let (faces, positions) = primitives::icosphere(1.0, args.subdivisions);
    MembraneSystem::new(&faces, positions, params, None).context("building membrane system")
}

/// Evaluate forces and energies once without GUI or time stepping
fn run_diagnostics(args: &CliArgs) -> Result<()> {
    println!("=== Membrane Simulator X - Force Diagnostics ===\n");

    let mut system = build_system(args)?;
    println!(
        "Mesh: {} vertices, {} edges, {} faces",
        system.mesh.n_vertices(),
        system.mesh.n_edges(),
        system.mesh.n_faces()
    );
    println!(
        "Area: {:.6}, volume: {:.6}, min edge: {:.4}",
        system.geometry.surface_area,
        system.geometry.volume,
        system.geometry.min_edge_length()
    );

    let start = Instant::now();
    system.compute_conservative_forcing();
    let energy = system.compute_total_energy();
    let elapsed = start.elapsed();

    println!("\n=== Energy ===");
    for (name, value) in energy.components() {
        println!("  {:<17} {:.6e}", name, value);
    }
    println!("  {:<17} {:.6e}", "potential", energy.potential);

    println!("\n=== Forces ===");
    for (name, field) in system.forces.vector_fields() {
        let max = field.iter().fold(0.0_f64, |m, f| m.max(f.length()));
        println!("  {:<17} max |F| = {:.6e}", name, max);
    }
    println!("  surface tension   {:.6e}", system.forces.surface_tension);
    println!("  osmotic pressure  {:.6e}", system.forces.osmotic_pressure);
    println!("  |F| = {:.6e}, |μ| = {:.6e}", system.mechanical_norm(), system.chemical_norm());
    println!("\nEvaluation time: {:.2?}", elapsed);

    let record = system.frame_record(0, system.mechanical_norm(), system.chemical_norm());
    let path = export_frame_json(&record, &args.output).context("exporting initial frame")?;
    println!("Snapshot: {}", path.display());

    println!("\n=== Diagnostic Checks ===");
    let non_finite = system
        .forces
        .vector_fields()
        .iter()
        .any(|(_, field)| field.iter().any(|f| !f.is_finite()));
    if non_finite || !energy.potential.is_finite() {
        println!("⚠️  WARNING: non-finite forces or energy");
    } else {
        println!("✓ Forces and energy are finite");
    }
    Ok(())
}

/// Ctrl-C lets the current step finish, then the run saves its final frame
fn stop_on_interrupt(exit: Arc<AtomicBool>) -> impl Fn() + Send + 'static {
    move || {
        log::warn!("Interrupt received, stopping after the current step");
        exit.store(true, Ordering::Relaxed);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    log::info!("Membrane Simulator X starting...");

    let mut system = build_system(args)?;
    let options = IntegratorOptions::load_or_default(&args.options);
    let mut stepper = integrator::build(&mut system, options).context("configuring integrator")?;
    ctrlc::set_handler(stop_on_interrupt(stepper.core().exit_handle()))
        .context("installing interrupt handler")?;

    let mut outputs = Outputs {
        csv: CsvExporter::in_dir(&args.output, 0.0)?,
        json: JsonFrameWriter::new(args.output.join("frames"))?,
    };

    let start = Instant::now();
    let summary = stepper.integrate(&mut system, &mut outputs)?;
    let path = outputs.csv.finish()?;

    println!("\n=== Results ===");
    println!("Status: {:?}", summary.status);
    println!("Steps: {}, frames: {}, time: {:.4}", summary.steps, summary.frames, summary.time);
    println!("Elapsed: {:.2?}", start.elapsed());
    println!("Time series: {}", path.display());

    if !summary.is_success() {
        log::warn!("Run did not converge: {:?}", summary.status);
    }
    Ok(())
}

/// Parse CLI arguments
fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        diagnose: false,
        parameters: PathBuf::from("parameters.json"),
        options: PathBuf::from("options.json"),
        subdivisions: 2,
        output: PathBuf::from("exports"),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--diagnose" | "-d" => cli.diagnose = true,
            "-p" | "--parameters" => {
                i += 1;
                if i < args.len() {
                    cli.parameters = PathBuf::from(&args[i]);
                }
            }
            "-o" | "--options" => {
                i += 1;
                if i < args.len() {
                    cli.options = PathBuf::from(&args[i]);
                }
            }
            "-s" | "--subdivisions" => {
                i += 1;
                if i < args.len() {
                    cli.subdivisions = args[i].parse().unwrap_or(2);
                }
            }
            "--out" => {
                i += 1;
                if i < args.len() {
                    cli.output = PathBuf::from(&args[i]);
                }
            }
            "--help" | "-h" => {
                println!("Membrane Simulator X");
                println!();
                println!("Usage: membrane-simulator-x [OPTIONS]");
                println!();
                println!("Options:");
                println!("  --diagnose, -d         Evaluate forces and energies once");
                println!("  -p, --parameters FILE  Physical parameters (default: parameters.json)");
                println!("  -o, --options FILE     Integrator options (default: options.json)");
                println!("  -s, --subdivisions N   Icosphere subdivisions (default: 2)");
                println!("  --out DIR              Output directory (default: exports)");
                println!("  --help, -h             Show this help");
                std::process::exit(0);
            }
            other => log::warn!("Ignoring unknown argument {:?}", other),
        }
        i += 1;
    }
    cli
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args();
    if args.diagnose {
        return run_diagnostics(&args);
    }
    run(&args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use membrane_simulator_x::IntegratorStatus;

    #[test]
    fn test_interrupt_stops_run_with_final_frame() {
        let (faces, positions) = primitives::icosphere(1.0, 1);
        let mut system = MembraneSystem::new(&faces, positions, Parameters::default(), None).unwrap();
        let options = IntegratorOptions {
            tolerance: 0.0,
            ..Default::default()
        };
        let mut stepper = integrator::build(&mut system, options).unwrap();
        let interrupt = stop_on_interrupt(stepper.core().exit_handle());
        interrupt();

        let mut frames: Vec<FrameRecord> = Vec::new();
        let summary = stepper.integrate(&mut system, &mut frames).unwrap();
        assert_eq!(summary.status, IntegratorStatus::Exited);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].positions.len(), system.n_vertices());
    }
}
