//! Decibel conversion of binned spectra
//!
//! Relative mode measures every bin against the same bin of a silence recording,
//! so the room's own floor sits at 0 dB. Absolute mode is plain 20 log10.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::audio::FanSpeed;
use crate::error::{AnalysisError, Result};
use crate::spectrum::{BinnedSpectrum, BinnedSpectrumMatrix};

/// Floor added to both numerator and denominator before taking log10
///
/// Keeps silent bins (magnitude exactly 0) finite: a zero bin against a zero
/// reference reads 0 dB, a zero bin in absolute mode reads -240 dB.
pub const DEFAULT_EPSILON: f64 = 1e-12;

/// Reference the decibel scale is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CalibrationMode {
    /// 20 log10((signal + eps) / (reference + eps))
    Relative,

    /// 20 log10(signal + eps)
    Absolute,
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationMode::Relative => write!(f, "relative to silence"),
            CalibrationMode::Absolute => write!(f, "absolute"),
        }
    }
}

/// Binned silence spectrum, one value per integer-Hz bin
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReference {
    bins: Vec<Option<f64>>,
}

impl CalibrationReference {
    pub fn new(bins: Vec<Option<f64>>) -> Self {
        Self { bins }
    }

    pub fn from_binned(binned: &BinnedSpectrum) -> Self {
        Self::new(binned.averages())
    }

    pub fn get(&self, bin: usize) -> Option<f64> {
        self.bins.get(bin).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// dB matrix with the rows that carry data
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedMatrix {
    values: Array2<Option<f64>>,
    frequencies: Vec<usize>,
    speeds: Vec<FanSpeed>,
    mode: CalibrationMode,
}

impl CalibratedMatrix {
    pub fn values(&self) -> &Array2<Option<f64>> {
        &self.values
    }

    /// Integer-Hz label of each retained row
    pub fn frequencies(&self) -> &[usize] {
        &self.frequencies
    }

    pub fn speeds(&self) -> &[FanSpeed] {
        &self.speeds
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn get(&self, frequency: usize, speed: FanSpeed) -> Option<f64> {
        let row = self.frequencies.binary_search(&frequency).ok()?;
        let col = self.speeds.binary_search(&speed).ok()?;
        self.values[[row, col]]
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty() || self.speeds.is_empty()
    }

    /// Dense copy with NaN for "no data", for plotting
    pub fn to_dense(&self) -> Array2<f64> {
        self.values.mapv(|v| v.unwrap_or(f64::NAN))
    }

    /// (min, max) over cells with data; the colour scale for a heatmap
    pub fn db_range(&self) -> Option<(f64, f64)> {
        self.values.iter().flatten().fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Converts binned spectra to decibels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibrator {
    mode: CalibrationMode,
    epsilon: f64,
}

impl Calibrator {
    /// # Errors
    /// `Config` if `epsilon` is not a positive finite number
    pub fn new(mode: CalibrationMode, epsilon: f64) -> Result<Self> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(AnalysisError::Config(format!(
                "epsilon must be positive and finite, got {}",
                epsilon
            )));
        }
        Ok(Self { mode, epsilon })
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Convert one cell; `None` when either side lacks data
    pub fn to_db(&self, signal: Option<f64>, reference: Option<f64>) -> Option<f64> {
        let signal = signal?;
        match self.mode {
            CalibrationMode::Relative => {
                let reference = reference?;
                Some(20.0 * ((signal + self.epsilon) / (reference + self.epsilon)).log10())
            }
            CalibrationMode::Absolute => Some(20.0 * (signal + self.epsilon).log10()),
        }
    }

    /// Calibrate every cell and drop rows left without any data
    ///
    /// # Errors
    /// `Config` when relative mode is asked to run without a reference
    pub fn calibrate(
        &self,
        matrix: &BinnedSpectrumMatrix,
        reference: Option<&CalibrationReference>,
    ) -> Result<CalibratedMatrix> {
        if self.mode == CalibrationMode::Relative && reference.is_none() {
            return Err(AnalysisError::Config(
                "relative calibration needs a silence reference".to_string(),
            ));
        }

        let source = matrix.values();
        let mut rows: Vec<Vec<Option<f64>>> = Vec::new();
        let mut frequencies = Vec::new();

        for (bin, row) in source.axis_iter(Axis(0)).enumerate() {
            let reference_bin = reference.and_then(|r| r.get(bin));
            let converted: Vec<Option<f64>> = row
                .iter()
                .map(|&signal| self.to_db(signal, reference_bin))
                .collect();

            if converted.iter().any(Option::is_some) {
                rows.push(converted);
                frequencies.push(bin);
            }
        }

        let num_cols = matrix.speeds().len();
        let mut values = Array2::from_elem((rows.len(), num_cols), None);
        for (r, row) in rows.into_iter().enumerate() {
            for (c, cell) in row.into_iter().enumerate() {
                values[[r, c]] = cell;
            }
        }

        debug!(
            "Dropped {} of {} frequency rows without data",
            matrix.num_bins() - frequencies.len(),
            matrix.num_bins()
        );
        info!(
            "Calibrated {} speeds x {} frequency bins ({})",
            num_cols,
            frequencies.len(),
            self.mode
        );

        Ok(CalibratedMatrix {
            values,
            frequencies,
            speeds: matrix.speeds().to_vec(),
            mode: self.mode,
        })
    }
}
