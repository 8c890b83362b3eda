//! Pipeline configuration loaded from TOML
//!
//! Both the trial-selection mode and the calibration mode must be spelled out;
//! there is no built-in default for either.
//!
//! ```toml
//! data_dir = "data3"
//! reference = "dataSilence/Recordings_20241209_092922/audio_1.wav"
//! max_frequency = 3500.0
//!
//! [selection]
//! mode = "quietest_average"
//! count = 3
//!
//! [calibration]
//! mode = "relative"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregate::{CalibrationMode, SelectionMode, DEFAULT_EPSILON};
use crate::error::{AnalysisError, Result};
use crate::spectrum::MAX_BINNABLE_FREQUENCY;

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding one sub-directory per trial
    pub data_dir: PathBuf,

    /// Where cross-trial tables go (defaults to `data_dir`)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Silence recording used as the 0 dB baseline
    #[serde(default)]
    pub reference: Option<PathBuf>,

    /// Highest integer-Hz bin kept; omitted means the data's own maximum
    #[serde(default)]
    pub max_frequency: Option<f64>,

    /// Floor added before log10, see `DEFAULT_EPSILON`
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    pub selection: SelectionMode,

    pub calibration: CalibrationMode,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

impl PipelineConfig {
    /// Load and validate a configuration file
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    ///
    /// # Errors
    /// - If the file cannot be read
    /// - If the TOML is malformed or a required key is missing
    /// - If a value fails validation
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;

        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(AnalysisError::Config(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if let Some(max) = self.max_frequency {
            if !(max.is_finite() && max > 0.0 && max <= MAX_BINNABLE_FREQUENCY) {
                return Err(AnalysisError::Config(format!(
                    "max_frequency must be in (0, {}] Hz, got {}",
                    MAX_BINNABLE_FREQUENCY, max
                )));
            }
        }
        if self.calibration == CalibrationMode::Relative && self.reference.is_none() {
            return Err(AnalysisError::Config(
                "relative calibration requires a `reference` recording".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory for cross-trial outputs
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.data_dir)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data_dir);
        if let Some(dir) = self.output_dir.as_mut() {
            resolve(dir);
        }
        if let Some(reference) = self.reference.as_mut() {
            resolve(reference);
        }
    }
}
