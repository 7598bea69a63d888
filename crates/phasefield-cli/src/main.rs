//! phasefield command-line interface.
//!
//! Run field simulations from TOML scene files:
//! ```sh
//! phasefield run scene.toml
//! phasefield validate scene.toml
//! phasefield pattern scene.toml --unit left
//! phasefield media
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use phasefield_core::Medium;

#[derive(Parser)]
#[command(name = "phasefield")]
#[command(about = "phasefield: phased-array beam and interference simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the field heatmap for a scene file.
    Run {
        /// Path to the scene file.
        config: PathBuf,
        /// Output directory (overrides scene file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a scene file without running the simulation.
    Validate {
        /// Path to the scene file.
        config: PathBuf,
    },
    /// Print the beam pattern summary of one unit.
    Pattern {
        /// Path to the scene file.
        config: PathBuf,
        /// Unit id or name.
        #[arg(short, long)]
        unit: String,
        /// Also print every sample at this angular step (degrees).
        #[arg(long)]
        step: Option<f64>,
    },
    /// List the built-in propagation media.
    Media,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("phasefield field simulation");
            println!("===========================");
            let scene_config = config::load_config(&config)?;
            println!("Scene: {}", config.display());

            let scene = runner::build_scene(&scene_config)?;
            println!(
                "  {} unit(s), medium {}, {}x{} grid",
                scene.units.len(),
                scene.medium,
                scene.request.resolution,
                scene.request.resolution
            );

            let backend = runner::create_backend(&scene_config.simulation.backend)?;
            // `max` first so a NaN timeout falls back to the floor.
            let timeout_secs = scene_config.simulation.timeout_secs.max(0.1).min(86_400.0);
            let timeout = Duration::from_secs_f64(timeout_secs);
            let result = runner::run_field(&scene, backend, timeout)?;
            println!("Computed in {:.2} ms", result.compute_time_ms);

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&scene_config.output.directory));

            if scene_config.output.save_heatmap {
                runner::write_heatmap_csv(&result, &out_dir.join("heatmap.csv"), &scene)?;
            }
            if scene_config.output.save_json {
                runner::write_result_json(&result, &out_dir.join("result.json"))?;
            }
            if scene_config.output.save_patterns {
                for unit in &scene.units {
                    let path = out_dir.join(format!("pattern_{}.csv", unit.id()));
                    runner::write_pattern_csv(unit, scene_config.output.pattern_step, &path)?;
                }
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let scene_config = config::load_config(&config)?;
            let scene = runner::build_scene(&scene_config)?;
            runner::create_backend(&scene_config.simulation.backend)?;
            println!(
                "Scene is valid: {} ({} unit(s), {} enabled)",
                config.display(),
                scene.units.len(),
                scene.request.active_units().count()
            );
            Ok(())
        }
        Commands::Pattern { config, unit, step } => {
            let scene_config = config::load_config(&config)?;
            let scene = runner::build_scene(&scene_config)?;
            let unit = runner::find_unit(&scene.units, &unit)?;
            runner::print_pattern_summary(unit);
            if let Some(step) = step {
                println!();
                println!("{:>9} {:>12} {:>9}", "angle", "magnitude", "dB");
                for s in unit.generate_beam_pattern(step) {
                    println!("{:>9.2} {:>12.6} {:>9.2}", s.angle, s.magnitude, s.db);
                }
            }
            Ok(())
        }
        Commands::Media => {
            println!("Available media:");
            println!();
            for medium in Medium::all() {
                println!("  {:<8} {:>7.1} m/s", medium.name(), medium.speed_of_sound());
            }
            println!();
            println!("  Any other speed of sound may be given in m/s, e.g. medium = \"1600\".");
            Ok(())
        }
    }
}
