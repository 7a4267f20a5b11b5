//! Run configuration loading and validation
//!
//! A run is configured by a single TOML file:
//!
//! ```toml
//! output_path = "events.xml"
//! hit_energy_threshold = 0.001      # GeV, kinetic-energy cut for tracked particles
//! cell_energy_threshold = 0.0       # GeV, cells below this are not written
//! keep_em_shower_daughters = false
//! max_events_to_process = 100
//!
//! [genie_input]
//! use = true
//! tracker_file = "genie.tracker"
//!
//! [detector]
//! center = [0.0, 0.0, 0.0]          # mm
//! width = [1000.0, 1000.0, 1000.0]  # mm
//! n_layers = 1000
//! ```
//!
//! Configuration is read once, validated, and then shared read-only for the
//! lifetime of the run.

use crate::genie::{load_genie_events, GenieEvent};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted when no configuration path is given
pub const CONFIG_ENV_VAR: &str = "G4TPC_CONFIG";

/// Configuration file looked up in the working directory as a last resort
pub const DEFAULT_CONFIG_FILE: &str = "g4tpc.toml";

/// Largest `detector.n_layers` whose n³ cell indices fit in an i64
pub const MAX_LAYERS: i64 = 2_097_151;

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Output record path; `.json` selects JSON, anything else XML
    #[serde(default)]
    pub output_path: PathBuf,

    /// Kinetic-energy threshold (GeV) below which non-primary particles are pruned
    #[serde(default = "default_hit_energy_threshold")]
    pub hit_energy_threshold: f64,

    /// Minimum accumulated cell energy (GeV) for a cell to be written
    #[serde(default)]
    pub cell_energy_threshold: f64,

    /// Keep particles created by electromagnetic shower processes
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub keep_em_shower_daughters: bool,

    #[serde(default = "default_max_events")]
    pub max_events_to_process: i64,

    /// Added to every engine track id (and parent id) to keep ids unique
    /// across chained events
    #[serde(default)]
    pub track_id_offset: i32,

    #[serde(default)]
    pub particle_gun: ParticleGunConfig,

    #[serde(default)]
    pub genie_input: GenieInputConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    /// Wire-plane readout; absent means no LArTPC hits are produced
    #[serde(default)]
    pub lartpc: Option<LArTpcConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Particle gun primary source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParticleGunConfig {
    #[serde(rename = "use", default, deserialize_with = "deserialize_flag")]
    pub enabled: bool,

    /// Particle name understood by the transport engine (e.g. "mu-")
    #[serde(default)]
    pub species: String,

    /// Total energy of each particle in GeV
    #[serde(default)]
    pub energy: Option<f64>,

    #[serde(default = "default_particles_per_event")]
    pub particles_per_event: i64,

    /// Explicit event count; `max_events_to_process` is used when absent
    #[serde(default)]
    pub n_events: Option<i64>,
}

/// Genie tracker file primary source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenieInputConfig {
    #[serde(rename = "use", default, deserialize_with = "deserialize_flag")]
    pub enabled: bool,

    #[serde(default)]
    pub tracker_file: Option<PathBuf>,
}

/// Liquid argon volume, all lengths in mm
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub center: [f64; 3],

    #[serde(default = "default_width")]
    pub width: [f64; 3],

    /// Bins per axis for 3D energy binning
    #[serde(default = "default_n_layers")]
    pub n_layers: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            center: [0.0; 3],
            width: default_width(),
            n_layers: default_n_layers(),
        }
    }
}

/// Angled-wire readout planes
///
/// Angles are radians measured from the vertical (y) axis; pitches in mm.
#[derive(Debug, Clone, Deserialize)]
pub struct LArTpcConfig {
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub write_hits: bool,

    /// Dual-phase readout has only the U and W views
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub dual_phase: bool,

    pub wire_angle_u: f64,
    #[serde(default)]
    pub wire_angle_v: Option<f64>,
    pub wire_angle_w: f64,

    pub wire_pitch_u: f64,
    #[serde(default)]
    pub wire_pitch_v: Option<f64>,
    pub wire_pitch_w: f64,

    /// Drift-coordinate separation (mm) below which hits on one wire merge
    #[serde(default = "default_drift_time_width")]
    pub drift_time_width: f64,

    /// Merged hits below this energy (GeV) are dropped
    #[serde(default)]
    pub hit_energy_threshold: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Where primary particles come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimarySource {
    ParticleGun,
    Genie,
}

fn default_hit_energy_threshold() -> f64 {
    0.001
}

fn default_max_events() -> i64 {
    i32::MAX as i64
}

fn default_particles_per_event() -> i64 {
    1
}

fn default_width() -> [f64; 3] {
    [1000.0; 3]
}

fn default_n_layers() -> i64 {
    1000
}

fn default_drift_time_width() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Interpret a textual flag: "0" and "false" (any case) are false, anything else true
pub fn parse_flag(text: &str) -> bool {
    let lower = text.trim().to_ascii_lowercase();
    !(lower == "0" || lower == "false")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match FlagValue::deserialize(deserializer)? {
        FlagValue::Bool(value) => value,
        FlagValue::Int(value) => value != 0,
        FlagValue::Text(value) => parse_flag(&value),
    })
}

impl RunConfig {
    /// Parse configuration text without validating it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigInvalid(format!("Failed to parse TOML: {}", e)))
    }

    /// Read, parse and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if the file cannot be read, is not
    /// valid TOML, or fails [`RunConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigInvalid(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = Self::from_toml_str(&text)?;
        config.validate()?;

        info!("Loaded run configuration from {:?}", path);
        Ok(config)
    }

    /// Check every option; all problems are reported together
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.particle_gun.enabled == self.genie_input.enabled {
            problems.push("exactly one of particle_gun.use and genie_input.use must be set".to_string());
        }

        if self.particle_gun.enabled {
            match self.particle_gun.energy {
                None => problems.push("particle_gun.energy not specified".to_string()),
                Some(energy) if !(energy >= 0.0) => {
                    problems.push(format!("particle_gun.energy must be non-negative, got {}", energy))
                }
                Some(_) => {}
            }
            if self.particle_gun.species.trim().is_empty() {
                problems.push("particle_gun.species not specified".to_string());
            }
            if self.particle_gun.particles_per_event <= 0 {
                problems.push("particle_gun.particles_per_event must be positive".to_string());
            }
            if matches!(self.particle_gun.n_events, Some(n) if n <= 0) {
                problems.push("particle_gun.n_events must be positive".to_string());
            }
        }

        if self.genie_input.enabled
            && self
                .genie_input
                .tracker_file
                .as_ref()
                .map_or(true, |p| p.as_os_str().is_empty())
        {
            problems.push("genie_input.tracker_file not specified".to_string());
        }

        if self.output_path.as_os_str().is_empty() {
            problems.push("output_path not specified".to_string());
        }
        if !(self.hit_energy_threshold >= 0.0) {
            problems.push(format!("hit_energy_threshold must be non-negative, got {}", self.hit_energy_threshold));
        }
        if !(self.cell_energy_threshold >= 0.0) {
            problems.push(format!("cell_energy_threshold must be non-negative, got {}", self.cell_energy_threshold));
        }
        if self.max_events_to_process <= 0 {
            problems.push("max_events_to_process must be positive".to_string());
        }
        if self.detector.width.iter().any(|w| !(*w > 0.0)) {
            problems.push(format!("detector.width must be positive on every axis, got {:?}", self.detector.width));
        }
        if self.detector.n_layers <= 0 {
            problems.push("detector.n_layers must be positive for 3D energy binning".to_string());
        } else if self.detector.n_layers > MAX_LAYERS {
            problems.push(format!(
                "detector.n_layers must be at most {} so cell indices fit in 64 bits, got {}",
                MAX_LAYERS, self.detector.n_layers
            ));
        }

        if let Some(lartpc) = &self.lartpc {
            lartpc.collect_problems(&mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigInvalid(problems.join("; ")))
        }
    }

    /// Active primary source; only meaningful on a validated config
    pub fn primary_source(&self) -> PrimarySource {
        if self.genie_input.enabled {
            PrimarySource::Genie
        } else {
            PrimarySource::ParticleGun
        }
    }

    /// Number of events the run will simulate
    pub fn events_to_process(&self, genie_event_count: usize) -> usize {
        let max = usize::try_from(self.max_events_to_process).unwrap_or(0);
        match self.primary_source() {
            PrimarySource::ParticleGun => self
                .particle_gun
                .n_events
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(max),
            PrimarySource::Genie => genie_event_count.min(max),
        }
    }
}

impl LArTpcConfig {
    fn collect_problems(&self, problems: &mut Vec<String>) {
        let mut pitches = vec![("wire_pitch_u", Some(self.wire_pitch_u)), ("wire_pitch_w", Some(self.wire_pitch_w))];
        if !self.dual_phase {
            pitches.push(("wire_pitch_v", self.wire_pitch_v));
            if self.wire_angle_v.is_none() {
                problems.push("lartpc.wire_angle_v required unless dual_phase".to_string());
            }
        }
        for (name, pitch) in pitches {
            match pitch {
                Some(p) if p > 0.0 => {}
                Some(p) => problems.push(format!("lartpc.{} must be positive, got {}", name, p)),
                None => problems.push(format!("lartpc.{} required unless dual_phase", name)),
            }
        }
        if !(self.drift_time_width >= 0.0) {
            problems.push("lartpc.drift_time_width must be non-negative".to_string());
        }
        if !(self.hit_energy_threshold >= 0.0) {
            problems.push("lartpc.hit_energy_threshold must be non-negative".to_string());
        }
    }
}

/// Configuration file resolution, highest priority first:
/// 1. Command-line argument
/// 2. `G4TPC_CONFIG` environment variable
/// 3. `g4tpc.toml` in the working directory
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    if fallback.exists() {
        return Ok(fallback);
    }

    Err(Error::ConfigInvalid(format!(
        "No configuration file given (argument, {} or ./{})",
        CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE
    )))
}

/// Validated configuration plus everything loaded from it before the first event
#[derive(Debug, Clone)]
pub struct RunSetup {
    pub config: RunConfig,
    /// Genie events in file order, indexed by event number; empty for gun runs
    pub genie_events: Vec<GenieEvent>,
    /// Number of malformed tracker lines that were skipped
    pub genie_parse_errors: usize,
}

impl RunSetup {
    /// Load genie input if requested
    ///
    /// An unreadable tracker file is reported and treated as zero events;
    /// zero events with genie input requested is a configuration error.
    pub fn prepare(config: RunConfig) -> Result<Self> {
        config.validate()?;

        let mut genie_events = Vec::new();
        let mut genie_parse_errors = 0;

        if config.primary_source() == PrimarySource::Genie {
            let path = config.genie_input.tracker_file.clone().unwrap_or_default();
            match load_genie_events(&path) {
                Ok(load) => {
                    genie_parse_errors = load.errors.len();
                    genie_events = load.events;
                }
                Err(e) => warn!("Unable to load genie events: {}", e),
            }

            if genie_events.is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "genie input requested but no events loaded from {:?}",
                    path
                )));
            }
        }

        Ok(Self {
            config,
            genie_events,
            genie_parse_errors,
        })
    }

    pub fn events_to_process(&self) -> usize {
        self.config.events_to_process(self.genie_events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUN: &str = r#"
output_path = "out.xml"

[particle_gun]
use = true
species = "mu-"
energy = 2.0
"#;

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_toml_str(GUN).unwrap();
        assert_eq!(config.hit_energy_threshold, 0.001);
        assert_eq!(config.cell_energy_threshold, 0.0);
        assert!(!config.keep_em_shower_daughters);
        assert_eq!(config.detector.n_layers, 1000);
        assert_eq!(config.detector.width, [1000.0; 3]);
        assert_eq!(config.particle_gun.particles_per_event, 1);
        assert_eq!(config.logging.level, "info");
        assert!(config.lartpc.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag("0"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("FALSE"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(parse_flag("true"));
    }

    #[test]
    fn test_flag_accepts_string_and_int() {
        let text = format!("keep_em_shower_daughters = \"False\"\n{}", GUN);
        assert!(!RunConfig::from_toml_str(&text).unwrap().keep_em_shower_daughters);

        let text = format!("keep_em_shower_daughters = 1\n{}", GUN);
        assert!(RunConfig::from_toml_str(&text).unwrap().keep_em_shower_daughters);

        let text = format!("keep_em_shower_daughters = \"keep\"\n{}", GUN);
        assert!(RunConfig::from_toml_str(&text).unwrap().keep_em_shower_daughters);
    }

    #[test]
    fn test_both_sources_rejected() {
        let text = format!("{}\n[genie_input]\nuse = true\ntracker_file = \"g.txt\"\n", GUN);
        let err = RunConfig::from_toml_str(&text).unwrap().validate().unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(msg) if msg.contains("exactly one")));
    }

    #[test]
    fn test_no_source_rejected() {
        let config = RunConfig::from_toml_str("output_path = \"out.xml\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gun_requires_energy_and_species() {
        let config = RunConfig::from_toml_str("output_path = \"o.xml\"\n[particle_gun]\nuse = true\n").unwrap();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("energy"));
        assert!(msg.contains("species"));
    }

    #[test]
    fn test_non_positive_geometry_rejected() {
        let text = format!("{}\n[detector]\nwidth = [1000.0, 0.0, 1000.0]\nn_layers = 0\n", GUN);
        let msg = RunConfig::from_toml_str(&text).unwrap().validate().unwrap_err().to_string();
        assert!(msg.contains("width"));
        assert!(msg.contains("n_layers"));
    }

    #[test]
    fn test_layer_count_bounded_by_index_range() {
        let at_limit = format!("{}\n[detector]\nn_layers = {}\n", GUN, MAX_LAYERS);
        RunConfig::from_toml_str(&at_limit).unwrap().validate().unwrap();

        let text = format!("{}\n[detector]\nn_layers = 3000000\n", GUN);
        let msg = RunConfig::from_toml_str(&text).unwrap().validate().unwrap_err().to_string();
        assert!(msg.contains("n_layers must be at most"));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let text = format!("hit_energy_threshold = -0.5\n{}", GUN);
        assert!(RunConfig::from_toml_str(&text).unwrap().validate().is_err());
    }

    #[test]
    fn test_missing_output_rejected() {
        let config = RunConfig::from_toml_str("[particle_gun]\nuse = true\nspecies = \"e-\"\nenergy = 1.0\n").unwrap();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("output_path"));
    }

    #[test]
    fn test_lartpc_dual_phase_needs_no_v_view() {
        let text = format!(
            "{}\n[lartpc]\ndual_phase = true\nwire_angle_u = 0.6\nwire_angle_w = 0.0\nwire_pitch_u = 5.0\nwire_pitch_w = 5.0\n",
            GUN
        );
        RunConfig::from_toml_str(&text).unwrap().validate().unwrap();

        let single = text.replace("dual_phase = true", "dual_phase = false");
        let msg = RunConfig::from_toml_str(&single).unwrap().validate().unwrap_err().to_string();
        assert!(msg.contains("wire_angle_v"));
        assert!(msg.contains("wire_pitch_v"));
    }

    #[test]
    fn test_events_to_process() {
        let config = RunConfig::from_toml_str(&format!("max_events_to_process = 7\n{}", GUN)).unwrap();
        assert_eq!(config.events_to_process(0), 7);

        let text = format!("max_events_to_process = 7\n{}n_events = 3\n", GUN);
        assert_eq!(RunConfig::from_toml_str(&text).unwrap().events_to_process(0), 3);

        let genie = RunConfig::from_toml_str(
            "output_path = \"o.xml\"\nmax_events_to_process = 7\n[genie_input]\nuse = true\ntracker_file = \"g\"\n",
        )
        .unwrap();
        assert_eq!(genie.primary_source(), PrimarySource::Genie);
        assert_eq!(genie.events_to_process(4), 4);
        assert_eq!(genie.events_to_process(40), 7);
    }

    #[test]
    fn test_prepare_missing_tracker_file_is_config_error() {
        let config = RunConfig::from_toml_str(
            "output_path = \"o.xml\"\n[genie_input]\nuse = true\ntracker_file = \"/nonexistent/g4tpc/genie.txt\"\n",
        )
        .unwrap();
        let err = RunSetup::prepare(config).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(msg) if msg.contains("no events")));
    }
}
