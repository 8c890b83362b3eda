//! Python bindings for the batch pipeline

use numpy::{PyArray1, PyArray2};
use pyo3::prelude::*;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;

/// Run the full pipeline from a TOML config
///
/// Args:
///     config_path: Path to the pipeline config
///
/// Returns:
///     (calibrated dB matrix with NaN for missing cells, frequencies in Hz, fan speeds)
#[pyfunction]
pub fn run_pipeline<'py>(
    py: Python<'py>,
    config_path: &str,
) -> PyResult<(&'py PyArray2<f64>, &'py PyArray1<u64>, &'py PyArray1<u8>)> {
    let config = PipelineConfig::load(Path::new(config_path))?;
    let pipeline = Pipeline::new(config)?;

    let output = py.allow_threads(|| pipeline.run())?;
    let calibrated = output.calibrated;

    let frequencies: Vec<u64> = calibrated.frequencies().iter().map(|&f| f as u64).collect();
    let speeds: Vec<u8> = calibrated.speeds().iter().map(|s| s.value()).collect();

    Ok((
        PyArray2::from_owned_array(py, calibrated.to_dense()),
        PyArray1::from_vec(py, frequencies),
        PyArray1::from_vec(py, speeds),
    ))
}
