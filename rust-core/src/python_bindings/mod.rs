//! PyO3 bindings for Python integration

use pyo3::exceptions::{PyFileNotFoundError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::error::AnalysisError;

mod pipeline_bindings;
mod spectrum_bindings;

impl From<AnalysisError> for PyErr {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::MissingFile(_) | AnalysisError::MissingReference(_) => {
                PyFileNotFoundError::new_err(err.to_string())
            }
            AnalysisError::Config(_) | AnalysisError::LengthMismatch { .. } => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// Python module definition
#[pymodule]
fn fan_acoustics(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<spectrum_bindings::PySpectralAnalyzer>()?;
    m.add_class::<spectrum_bindings::PyFrequencyBinner>()?;
    m.add_function(wrap_pyfunction!(spectrum_bindings::analyze_file, m)?)?;
    m.add_function(wrap_pyfunction!(pipeline_bindings::run_pipeline, m)?)?;

    Ok(())
}
