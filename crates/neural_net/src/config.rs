//! Engine configuration
//!
//! Defaults, optionally replaced by a TOML file, then overridden by
//! `NEURAL_NET_*` environment variables. The CLI applies its flags last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dataset::{LabelColumn, SplitConfig};
use crate::errors::{Result, TrainerError};
use crate::plot::{DEFAULT_PLOT_PATH, DEFAULT_PLOT_SIZE};
use crate::trainer::TrainingConfig;

/// Names a TOML file to load before the other overrides
pub const ENV_CONFIG_FILE: &str = "NEURAL_NET_CONFIG";
pub const ENV_EPOCHS: &str = "NEURAL_NET_EPOCHS";
pub const ENV_LEARNING_RATE: &str = "NEURAL_NET_LEARNING_RATE";
pub const ENV_SEED: &str = "NEURAL_NET_SEED";
pub const ENV_HIDDEN_WIDTH: &str = "NEURAL_NET_HIDDEN_WIDTH";
pub const ENV_PLOT_PATH: &str = "NEURAL_NET_PLOT_PATH";
pub const ENV_LABEL: &str = "NEURAL_NET_LABEL";

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the loss plot is written
    pub plot_path: PathBuf,
    pub plot_width: u32,
    pub plot_height: u32,
    /// Emit a progress line every N epochs (process entry point only)
    pub progress_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plot_path: PathBuf::from(DEFAULT_PLOT_PATH),
            plot_width: DEFAULT_PLOT_SIZE.0,
            plot_height: DEFAULT_PLOT_SIZE.1,
            progress_every: 1,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub training: TrainingConfig,
    pub split: SplitConfig,
    pub output: OutputConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|err| TrainerError::io(path, err))?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            TrainerError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Defaults, then `NEURAL_NET_CONFIG`, then the other environment overrides
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) if !path.is_empty() => Self::load_from_file(path)?,
            _ => Self::default(),
        };
        config.apply_overrides(lookup);
        Ok(config)
    }

    /// Apply `NEURAL_NET_*` overrides; unparsable values are ignored with a warning
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_EPOCHS) {
            self.training.epochs = parse_or_keep(ENV_EPOCHS, &val, self.training.epochs);
        }
        if let Some(val) = lookup(ENV_LEARNING_RATE) {
            self.training.learning_rate =
                parse_or_keep(ENV_LEARNING_RATE, &val, self.training.learning_rate);
        }
        if let Some(val) = lookup(ENV_SEED) {
            self.training.seed = parse_or_keep(ENV_SEED, &val, self.training.seed);
        }
        if let Some(val) = lookup(ENV_HIDDEN_WIDTH) {
            self.training.hidden_width =
                parse_or_keep(ENV_HIDDEN_WIDTH, &val, self.training.hidden_width);
        }
        if let Some(val) = lookup(ENV_PLOT_PATH) {
            if !val.is_empty() {
                self.output.plot_path = PathBuf::from(val);
            }
        }
        if let Some(val) = lookup(ENV_LABEL) {
            if !val.is_empty() {
                self.split.label = LabelColumn::Name(val);
            }
        }
    }

    /// Reject invalid values; return warnings for questionable ones
    pub fn validate(&self) -> Result<Vec<String>> {
        self.training.validate()?;
        if self.output.plot_width < 64 || self.output.plot_height < 64 {
            return Err(TrainerError::Config(format!(
                "plot size {}x{} is too small",
                self.output.plot_width, self.output.plot_height
            )));
        }

        let mut warnings = Vec::new();
        if self.training.learning_rate > 10.0 {
            warnings.push(format!(
                "learning_rate {} is very large, training is likely to diverge",
                self.training.learning_rate
            ));
        }
        if self.training.epochs > 1_000_000 {
            warnings.push(format!("{} epochs will take a long time", self.training.epochs));
        }
        if self.output.progress_every == 0 {
            warnings.push("progress_every is 0, progress lines disabled".to_string());
        }
        if self.split.max_classes == 0 {
            warnings.push("max_classes is 0, integral labels are treated as regression".to_string());
        }

        for warning in &warnings {
            warn!("Configuration: {}", warning);
        }
        Ok(warnings)
    }

    pub fn plot_size(&self) -> (u32, u32) {
        (self.output.plot_width, self.output.plot_height)
    }
}

fn parse_or_keep<T: std::str::FromStr + Copy>(key: &str, raw: &str, current: T) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            current
        }
    }
}
