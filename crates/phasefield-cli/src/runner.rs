//! Scene runner: builds units from a scene, drives the field worker, and
//! writes results.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use phasefield_compute::{
    ComputeBackend, FieldRequest, FieldResult, FieldWorker, JobTracker, SerialBackend,
    WorkerEvent,
};
use phasefield_core::fields::DEFAULT_MIN_DB;
use phasefield_core::{ArrayUnit, Medium};

use crate::config::SceneConfig;

/// Live units plus the request snapshot taken from them.
pub struct Scene {
    pub medium: Medium,
    pub units: Vec<ArrayUnit>,
    pub request: FieldRequest,
}

/// Turn a parsed scene file into live units and a validated request.
pub fn build_scene(config: &SceneConfig) -> Result<Scene> {
    let sim = &config.simulation;
    let medium = sim.medium()?;
    let speed = medium.speed_of_sound();

    let mut units: Vec<ArrayUnit> = config
        .units
        .iter()
        .map(|c| ArrayUnit::from_config(c, speed))
        .collect();
    if let Some(steering) = sim.steering {
        for unit in &mut units {
            unit.set_steering_angle(steering);
        }
    }

    let mut request = FieldRequest::from_units(&units, medium)
        .with_render_mode(sim.render_mode)
        .with_wideband_mode(sim.wideband_mode)
        .with_resolution(sim.resolution)
        .with_bounds(sim.bounds);
    request.steering.theta = sim.steering.unwrap_or(0.0);
    request
        .validate()
        .context("Scene does not describe a valid field request")?;

    Ok(Scene { medium, units, request })
}

/// Map the `backend` setting to a backend instance.
pub fn create_backend(name: &str) -> Result<Arc<dyn ComputeBackend>> {
    match name {
        "auto" | "cpu" => Ok(phasefield_compute::default_backend()),
        "serial" => Ok(Arc::new(SerialBackend)),
        other => bail!("Unknown backend '{}'. Valid backends: auto, cpu, serial", other),
    }
}

/// Submit the scene's request to a fresh worker and wait for its result.
pub fn run_field(
    scene: &Scene,
    backend: Arc<dyn ComputeBackend>,
    timeout: Duration,
) -> Result<FieldResult> {
    let mut worker = FieldWorker::spawn_with_backend("phasefield-worker", backend)?;
    let mut tracker = JobTracker::new();
    let job_id = worker.supersede(&mut tracker, scene.request.clone())?;
    log::info!("Submitted {}", job_id);

    let mut last_reported = 0.0;
    loop {
        let event = worker
            .recv_timeout(timeout)
            .with_context(|| format!("Waiting for {}", job_id))?;
        let Some(event) = tracker.accept(event) else {
            continue;
        };
        match event {
            WorkerEvent::Progress { fraction, .. } => {
                if fraction - last_reported >= 0.25 || fraction >= 1.0 {
                    println!("  {:>3.0}%", fraction * 100.0);
                    last_reported = fraction;
                }
            }
            WorkerEvent::Result { result, .. } => return Ok(result),
            WorkerEvent::Error { message, .. } => bail!("Field job failed: {}", message),
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Write the heatmap to a CSV file with a metadata header, one grid row per
/// line.
pub fn write_heatmap_csv(result: &FieldResult, path: &Path, scene: &Scene) -> Result<()> {
    use std::io::Write;

    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# phasefield field heatmap")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# medium: {}", scene.medium)?;
    writeln!(
        file,
        "# render_mode: {:?}, wideband_mode: {:?}",
        scene.request.render_mode, scene.request.wideband_mode
    )?;
    writeln!(file, "# grid: {}x{}, columns span -90..90 deg", result.width, result.height)?;
    for unit in &scene.units {
        writeln!(
            file,
            "# unit '{}' ({}): {} elements, {:.1} Hz, steering {:.1} deg, enabled={}",
            unit.name(),
            unit.id(),
            unit.element_count(),
            unit.frequency(),
            unit.steering_angle(),
            unit.is_enabled()
        )?;
    }
    writeln!(file, "#")?;

    for row in result.heatmap.chunks(result.width.max(1)) {
        let line: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
        writeln!(file, "{}", line.join(","))?;
    }

    println!("Heatmap written to: {}", path.display());
    Ok(())
}

/// Write the full result to a JSON file.
pub fn write_result_json(result: &FieldResult, path: &Path) -> Result<()> {
    create_parent(path)?;
    let json = serde_json::to_string_pretty(result).context("JSON serialisation error")?;
    std::fs::write(path, json)?;
    println!("Result (JSON) written to: {}", path.display());
    Ok(())
}

/// Write one unit's beam pattern to a CSV file.
pub fn write_pattern_csv(unit: &ArrayUnit, step_deg: f64, path: &Path) -> Result<()> {
    use std::io::Write;

    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# phasefield beam pattern: unit '{}' ({})", unit.name(), unit.id())?;
    writeln!(file, "# dB floor: {}", DEFAULT_MIN_DB)?;
    writeln!(file, "angle_deg,magnitude,db")?;
    for sample in unit.generate_beam_pattern(step_deg) {
        writeln!(file, "{:.3},{:.6e},{:.3}", sample.angle, sample.magnitude, sample.db)?;
    }
    println!("Pattern written to: {}", path.display());
    Ok(())
}

/// Find a unit by id, falling back to its name.
pub fn find_unit<'a>(units: &'a [ArrayUnit], key: &str) -> Result<&'a ArrayUnit> {
    units
        .iter()
        .find(|u| u.id() == key)
        .or_else(|| units.iter().find(|u| u.name() == key))
        .with_context(|| {
            let known: Vec<&str> = units.iter().map(|u| u.name()).collect();
            format!("No unit '{}'. Units in scene: {}", key, known.join(", "))
        })
}

/// Print a synchronous summary of one unit's pattern.
pub fn print_pattern_summary(unit: &ArrayUnit) {
    println!("Unit '{}' ({})", unit.name(), unit.id());
    println!(
        "  {} elements, pitch {:.4} m, {:?}",
        unit.element_count(),
        unit.pitch(),
        unit.geometry()
    );
    println!(
        "  {:.1} Hz, c = {:.1} m/s, lambda = {:.4} m, d/lambda = {:.3}",
        unit.frequency(),
        unit.speed_of_sound(),
        unit.wavelength(),
        unit.pitch_lambda_ratio()
    );
    println!("  Steering:        {:>7.2} deg", unit.steering_angle());
    println!("  Main lobe:       {:>7.2} deg", unit.main_lobe_angle());
    println!("  -3 dB width:     {:>7.2} deg", unit.half_power_beamwidth());
    if unit.has_grating_lobes() {
        println!("  Warning: element spacing admits grating lobes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use phasefield_compute::RenderMode;

    const SCENE: &str = r#"
        [simulation]
        medium = "water"
        steering = 15.0
        resolution = 16
        backend = "serial"

        [[unit]]
        name = "left"
        position = { x = -0.2, y = 0.0 }

        [[unit]]
        name = "right"
        position = { x = 0.2, y = 0.0 }
    "#;

    #[test]
    fn test_build_scene_applies_overrides() {
        let scene = build_scene(&parse_config(SCENE).unwrap()).unwrap();
        assert_eq!(scene.medium, Medium::Water);
        assert_eq!(scene.units.len(), 2);
        assert!(scene.units.iter().all(|u| u.steering_angle() == 15.0));
        assert!(scene.units.iter().all(|u| u.speed_of_sound() == 1480.0));
        assert_eq!(scene.request.steering.theta, 15.0);
        assert_eq!(scene.request.units[1].steering_angle, 15.0);
    }

    #[test]
    fn test_build_scene_rejects_invalid_request() {
        let config = parse_config("[simulation]\nresolution = 1").unwrap();
        assert!(build_scene(&config).is_err());
        let config = parse_config("[simulation]\nrender_mode = \"array-geometry\"").unwrap();
        assert!(build_scene(&config).is_err());
    }

    #[test]
    fn test_run_field_end_to_end() {
        let config = parse_config(SCENE).unwrap();
        let scene = build_scene(&config).unwrap();
        let backend = create_backend(&config.simulation.backend).unwrap();
        let result = run_field(&scene, backend, Duration::from_secs(10)).unwrap();
        assert_eq!(result.heatmap.len(), 256);
        assert_eq!(scene.request.render_mode, RenderMode::Interference);
    }

    #[test]
    fn test_find_unit_by_name_or_id() {
        let scene = build_scene(&parse_config(SCENE).unwrap()).unwrap();
        let right = find_unit(&scene.units, "right").unwrap();
        assert_eq!(find_unit(&scene.units, right.id()).unwrap().name(), "right");
        assert!(find_unit(&scene.units, "middle").is_err());
    }

    #[test]
    fn test_unknown_backend() {
        assert!(create_backend("gpu").is_err());
    }
}
