//! Fan Acoustics - Noise Characterization Core
//!
//! Turns many repeated recordings of a fan across its speed range into a
//! per-speed loudness table and a silence-calibrated spectrum matrix.

// Suppress PyO3 non-local impl warnings (harmless macro-generated code)
#![cfg_attr(feature = "python", allow(non_local_definitions))]

pub mod aggregate;
pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod spectrum;
pub mod storage;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use aggregate::{CalibrationMode, Calibrator, SelectionMode, SpectraSelector, VolumeAggregator};
pub use audio::{FanSpeed, Recording};
pub use config::PipelineConfig;
pub use error::{AnalysisError, Result};
pub use pipeline::Pipeline;
pub use spectrum::{FrequencyBinner, SpectralAnalyzer};
