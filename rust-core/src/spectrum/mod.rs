//! Spectral analysis with FFT

pub mod analysis;
pub mod binning;
pub mod fft;
pub mod matrix;

pub use analysis::{FrequencyGrid, SpectralAnalyzer, SpectralSample};
pub use binning::{BinnedSpectrum, FrequencyBinner, MAX_BINNABLE_FREQUENCY};
pub use fft::FftEngine;
pub use matrix::BinnedSpectrumMatrix;
