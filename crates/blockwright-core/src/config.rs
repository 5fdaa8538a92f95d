//! Configuration loading and typed config structures for Blockwright.
//!
//! The canonical configuration lives in `blockwright-config.yaml` at the
//! project root. Every field has a default, so an empty file (or no file at
//! all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use blockwright_plan::RasterSettings;
use blockwright_types::{ImageLayout, PaletteSelection};

use crate::drift::DriftThresholds;
use crate::executor::{ExecutorSettings, FailurePolicy};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or inconsistent with another value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `blockwright-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BlockwrightConfig {
    /// Agent identity.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Plan source and data directories.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Build executor tuning.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Checkpoint store backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Plan compiler defaults.
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Image download limits.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BlockwrightConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `BLOCKWRIGHT_DATA_DIR` overrides `paths.data_dir`
    /// - `DRAGONFLY_URL` overrides `store.dragonfly_url`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise use defaults (still applying
    /// environment overrides).
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::parse("")
        }
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BLOCKWRIGHT_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.store.dragonfly_url = val;
        }
    }

    /// Reject values the executor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.executor;
        if !(e.reach_distance > 0.0 && e.reach_distance < e.relocate_distance) {
            return Err(ConfigError::Invalid(format!(
                "executor.reach_distance ({}) must be positive and below relocate_distance ({})",
                e.reach_distance, e.relocate_distance
            )));
        }
        if e.min_speed_factor <= Decimal::ZERO || e.min_speed_factor > e.max_speed_factor {
            return Err(ConfigError::Invalid(format!(
                "speed factor bounds {}..{} are invalid",
                e.min_speed_factor, e.max_speed_factor
            )));
        }
        if e.checkpoint_interval == 0 || e.relocation_check_interval == 0 {
            return Err(ConfigError::Invalid(
                "executor intervals must be at least 1".to_owned(),
            ));
        }
        let c = &self.compiler;
        if c.max_dimension == 0 || !(1..=c.max_dimension).contains(&c.default_width) {
            return Err(ConfigError::Invalid(format!(
                "compiler.default_width ({}) must be within 1..={}",
                c.default_width, c.max_dimension
            )));
        }
        if self.agent.name.trim().is_empty() {
            return Err(ConfigError::Invalid("agent.name is empty".to_owned()));
        }
        Ok(())
    }
}

/// Agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    /// Name used in chat and as the checkpoint slot key.
    #[serde(default = "default_agent_name")]
    pub name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    /// Raster images available to `!build`.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Blueprints available to `!schem`.
    #[serde(default = "default_schematics_dir")]
    pub schematics_dir: PathBuf,

    /// Checkpoint documents for the file store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            schematics_dir: default_schematics_dir(),
            data_dir: default_data_dir(),
        }
    }
}

/// Build executor tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutorConfig {
    /// Targets within this distance are placed without moving.
    #[serde(default = "default_reach_distance")]
    pub reach_distance: f64,

    /// Beyond this distance the agent must relocate to the origin.
    #[serde(default = "default_relocate_distance")]
    pub relocate_distance: f64,

    /// Check for relocation on every Nth non-empty step.
    #[serde(default = "default_relocation_check_interval")]
    pub relocation_check_interval: u32,

    /// Write a checkpoint and progress event every N placements.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Pause between placement attempts at speed factor 1.0.
    #[serde(default = "default_placement_delay_ms")]
    pub placement_delay_ms: u64,

    /// Slowest accepted speed factor.
    #[serde(default = "default_min_speed_factor")]
    pub min_speed_factor: Decimal,

    /// Fastest accepted speed factor.
    #[serde(default = "default_max_speed_factor")]
    pub max_speed_factor: Decimal,

    /// Pause after this many consecutive failed placements. `0` skips
    /// failed placements forever.
    #[serde(default)]
    pub pause_after_failures: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            reach_distance: default_reach_distance(),
            relocate_distance: default_relocate_distance(),
            relocation_check_interval: default_relocation_check_interval(),
            checkpoint_interval: default_checkpoint_interval(),
            placement_delay_ms: default_placement_delay_ms(),
            min_speed_factor: default_min_speed_factor(),
            max_speed_factor: default_max_speed_factor(),
            pause_after_failures: 0,
        }
    }
}

impl ExecutorConfig {
    /// Runtime settings for the executor.
    pub fn settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            thresholds: DriftThresholds::new(self.reach_distance, self.relocate_distance),
            relocation_check_interval: self.relocation_check_interval.max(1),
            checkpoint_interval: self.checkpoint_interval.max(1),
            placement_delay: Duration::from_millis(self.placement_delay_ms),
            min_speed_factor: self.min_speed_factor,
            max_speed_factor: self.max_speed_factor,
            failure_policy: match self.pause_after_failures {
                0 => FailurePolicy::Skip,
                n => FailurePolicy::PauseAfter(n),
            },
        }
    }
}

/// Which checkpoint store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON document per agent under `paths.data_dir`.
    #[default]
    File,
    /// In-process only; progress is lost on exit.
    Memory,
    /// `Dragonfly`/Redis at `store.dragonfly_url`.
    Dragonfly,
}

/// Checkpoint store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackend,

    /// `Dragonfly` connection URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// Terminal records kept per agent (`0` keeps all).
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            dragonfly_url: default_dragonfly_url(),
            history_retention: default_history_retention(),
        }
    }
}

/// Plan compiler defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CompilerConfig {
    /// Palette when a command does not name one.
    #[serde(default)]
    pub default_palette: PaletteSelection,

    /// Width when a command does not give a size.
    #[serde(default = "default_width")]
    pub default_width: u32,

    /// Largest accepted width or height.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Pixels with alpha below this become empty ops.
    #[serde(default = "default_alpha_threshold")]
    pub alpha_threshold: u8,

    /// Orientation of image builds.
    #[serde(default)]
    pub layout: ImageLayout,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_palette: PaletteSelection::default(),
            default_width: default_width(),
            max_dimension: default_max_dimension(),
            alpha_threshold: default_alpha_threshold(),
            layout: ImageLayout::default(),
        }
    }
}

impl CompilerConfig {
    /// Raster settings for the plan compiler.
    pub const fn raster_settings(&self) -> RasterSettings {
        RasterSettings {
            default_width: self.default_width,
            max_dimension: self.max_dimension,
            alpha_threshold: self.alpha_threshold,
        }
    }
}

/// Image download limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Largest accepted response body.
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            max_bytes: default_fetch_max_bytes(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_agent_name() -> String {
    "builder".to_owned()
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_schematics_dir() -> PathBuf {
    PathBuf::from("schematics")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("database")
}

const fn default_reach_distance() -> f64 {
    4.5
}

const fn default_relocate_distance() -> f64 {
    10.0
}

const fn default_relocation_check_interval() -> u32 {
    1
}

const fn default_checkpoint_interval() -> u64 {
    10
}

const fn default_placement_delay_ms() -> u64 {
    500
}

const fn default_min_speed_factor() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 1)
}

const fn default_max_speed_factor() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 0)
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_history_retention() -> usize {
    blockwright_store::DEFAULT_HISTORY_RETENTION
}

const fn default_width() -> u32 {
    64
}

const fn default_max_dimension() -> u32 {
    256
}

const fn default_alpha_threshold() -> u8 {
    128
}

const fn default_fetch_timeout_secs() -> u64 {
    30
}

const fn default_fetch_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BlockwrightConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.name, "builder");
        assert_eq!(config.executor.checkpoint_interval, 10);
        assert_eq!(config.executor.min_speed_factor, Decimal::new(1, 1));
        assert_eq!(config.executor.max_speed_factor, Decimal::new(5, 0));
        assert_eq!(config.store.history_retention, 100);
        assert_eq!(config.compiler.default_width, 64);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let shipped =
            BlockwrightConfig::parse(include_str!("../../../blockwright-config.yaml")).unwrap();
        assert_eq!(shipped, BlockwrightConfig::parse("").unwrap());
    }

    #[test]
    fn parse_partial_yaml_keeps_defaults() {
        let yaml = r"
agent:
  name: mason
executor:
  placement_delay_ms: 250
  pause_after_failures: 3
store:
  backend: memory
compiler:
  default_palette: concrete
  layout: floor
logging:
  format: json
";
        let config = BlockwrightConfig::parse(yaml).unwrap();
        assert_eq!(config.agent.name, "mason");
        assert_eq!(config.executor.placement_delay_ms, 250);
        assert_eq!(config.executor.checkpoint_interval, 10);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.compiler.default_palette, PaletteSelection::Concrete);
        assert_eq!(config.compiler.layout, ImageLayout::Floor);
        assert_eq!(config.logging.format, LogFormat::Json);

        let settings = config.executor.settings();
        assert_eq!(settings.failure_policy, FailurePolicy::PauseAfter(3));
        assert_eq!(settings.placement_delay, Duration::from_millis(250));
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = BlockwrightConfig::parse("").unwrap();
        assert_eq!(config.executor, ExecutorConfig::default());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let yaml = "executor:\n  reach_distance: 12.0\n  relocate_distance: 10.0\n";
        assert!(matches!(
            BlockwrightConfig::parse(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        assert!(matches!(
            BlockwrightConfig::parse("executor: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
