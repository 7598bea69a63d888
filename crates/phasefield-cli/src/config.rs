//! TOML scene files.
//!
//! ```toml
//! [simulation]
//! medium = "water"
//! steering = 20.0
//! render_mode = "beam-slice"
//! resolution = 256
//!
//! [[unit]]
//! name = "left"
//! position = { x = -0.25, y = 0.0 }
//! frequency = 40000.0
//!
//! [output]
//! directory = "./output"
//! save_json = true
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use phasefield_compute::{RenderMode, WidebandMode};
use phasefield_core::{ArrayUnitConfig, Bounds, Medium};

/// Top-level scene configuration.
#[derive(Debug, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default, rename = "unit")]
    pub units: Vec<ArrayUnitConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulation parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// Medium name (`air`, `water`, `tissue`) or a speed of sound in m/s.
    #[serde(default = "default_medium")]
    pub medium: String,
    /// Steering angle (degrees) applied to every unit when set.
    #[serde(default)]
    pub steering: Option<f64>,
    #[serde(default)]
    pub render_mode: RenderMode,
    #[serde(default)]
    pub wideband_mode: WidebandMode,
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    #[serde(default)]
    pub bounds: Bounds,
    /// Compute backend: "auto", "cpu", or "serial". Default: "auto".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Seconds to wait for the worker between events.
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            medium: default_medium(),
            steering: None,
            render_mode: RenderMode::default(),
            wideband_mode: WidebandMode::default(),
            resolution: default_resolution(),
            bounds: Bounds::default(),
            backend: default_backend(),
            timeout_secs: default_timeout(),
        }
    }
}

impl SimulationConfig {
    pub fn medium(&self) -> Result<Medium> {
        self.medium
            .parse()
            .with_context(|| format!("Invalid medium '{}'", self.medium))
    }
}

fn default_medium() -> String {
    "air".into()
}
fn default_resolution() -> usize {
    phasefield_compute::request::DEFAULT_RESOLUTION
}
fn default_backend() -> String {
    "auto".into()
}
fn default_timeout() -> f64 {
    30.0
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to write the heatmap as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_heatmap: bool,
    /// Whether to also write the full result as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to write each unit's beam pattern (default: false).
    #[serde(default)]
    pub save_patterns: bool,
    /// Angular step of saved beam patterns, degrees (default: 1).
    #[serde(default = "default_pattern_step")]
    pub pattern_step: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_heatmap: true,
            save_json: false,
            save_patterns: false,
            pattern_step: default_pattern_step(),
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}
fn default_pattern_step() -> f64 {
    1.0
}

/// Load and parse a TOML scene file.
pub fn load_config(path: &Path) -> Result<SceneConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<SceneConfig> {
    Ok(toml::from_str(content)?)
}
