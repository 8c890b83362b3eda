//! Python bindings for whole-recording spectral analysis

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::audio::Recording;
use crate::spectrum::{FrequencyBinner, SpectralAnalyzer};

/// Spectral analyzer exposed to Python
#[pyclass(name = "SpectralAnalyzer")]
pub struct PySpectralAnalyzer {
    analyzer: SpectralAnalyzer,
}

#[pymethods]
impl PySpectralAnalyzer {
    #[new]
    fn new() -> Self {
        Self {
            analyzer: SpectralAnalyzer::new(),
        }
    }

    /// Analyze a mono signal
    ///
    /// Args:
    ///     signal: Samples as numpy array
    ///     sample_rate: Sample rate in Hz
    ///
    /// Returns:
    ///     (average_volume, frequencies, magnitudes)
    fn analyze<'py>(
        &self,
        py: Python<'py>,
        signal: PyReadonlyArray1<f64>,
        sample_rate: u32,
    ) -> PyResult<(f64, &'py PyArray1<f64>, &'py PyArray1<f64>)> {
        let samples = signal
            .as_slice()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let sample = self.analyzer.analyze_samples(samples, sample_rate)?;

        Ok((
            sample.average_volume,
            PyArray1::from_vec(py, sample.frequencies),
            PyArray1::from_vec(py, sample.magnitudes),
        ))
    }

    /// Analyze a WAV recording on disk
    ///
    /// Returns:
    ///     (average_volume, frequencies, magnitudes)
    fn analyze_file<'py>(
        &self,
        py: Python<'py>,
        path: &str,
    ) -> PyResult<(f64, &'py PyArray1<f64>, &'py PyArray1<f64>)> {
        let recording = Recording::open(path)?;
        let sample = self.analyzer.analyze(&recording)?;

        Ok((
            sample.average_volume,
            PyArray1::from_vec(py, sample.frequencies),
            PyArray1::from_vec(py, sample.magnitudes),
        ))
    }
}

/// Analyze one WAV recording with a fresh analyzer
///
/// Returns:
///     (average_volume, frequencies, magnitudes)
#[pyfunction]
pub fn analyze_file<'py>(
    py: Python<'py>,
    path: &str,
) -> PyResult<(f64, &'py PyArray1<f64>, &'py PyArray1<f64>)> {
    PySpectralAnalyzer::new().analyze_file(py, path)
}

/// Integer-Hz binner exposed to Python
#[pyclass(name = "FrequencyBinner")]
pub struct PyFrequencyBinner {
    binner: FrequencyBinner,
}

#[pymethods]
impl PyFrequencyBinner {
    /// Args:
    ///     max_frequency: Highest bin kept, in Hz
    #[new]
    fn new(max_frequency: f64) -> PyResult<Self> {
        Ok(Self {
            binner: FrequencyBinner::new(max_frequency)?,
        })
    }

    /// Average magnitudes into 1 Hz bins
    ///
    /// Returns:
    ///     Per-bin averages, NaN where a bin received no data
    fn bin<'py>(
        &self,
        py: Python<'py>,
        frequencies: PyReadonlyArray1<f64>,
        magnitudes: PyReadonlyArray1<f64>,
    ) -> PyResult<&'py PyArray1<f64>> {
        let freqs = frequencies
            .as_slice()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let mags = magnitudes
            .as_slice()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;

        let binned = self.binner.bin(freqs, mags)?;
        let dense: Vec<f64> = binned
            .averages()
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Ok(PyArray1::from_vec(py, dense))
    }

    fn num_bins(&self) -> usize {
        self.binner.num_bins()
    }
}
