//! FFT engine using realfft for real-valued signals
//!
//! Sized to the whole recording: one transform per clip, no framing.

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::error::{AnalysisError, Result};

/// FFT engine for real-valued signals
pub struct FftEngine {
    /// FFT size (number of samples)
    fft_size: usize,

    /// Real FFT processor
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Reusable input buffer (realfft uses it as scratch)
    input_buffer: Vec<f64>,

    /// Reusable output buffer (complex spectrum)
    output_buffer: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of samples, any length)
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);

        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();

        Self {
            fft_size,
            r2c,
            input_buffer,
            output_buffer,
        }
    }

    /// Compute FFT and return the unnormalized magnitude spectrum
    ///
    /// # Arguments
    /// * `signal` - Input signal (zero-padded if shorter than fft_size, truncated if longer)
    ///
    /// # Returns
    /// Magnitude spectrum |X[k]| for k = 0..=fft_size/2
    pub fn compute_magnitude(&mut self, signal: &[f64]) -> Result<Vec<f64>> {
        let copy_len = signal.len().min(self.fft_size);
        self.input_buffer[..copy_len].copy_from_slice(&signal[..copy_len]);
        self.input_buffer[copy_len..].fill(0.0);

        self.r2c
            .process(&mut self.input_buffer, &mut self.output_buffer)
            .map_err(|e| AnalysisError::Fft(e.to_string()))?;

        Ok(self.output_buffer.iter().map(|c| c.norm()).collect())
    }

    /// Get number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_to_hz(&self, bin: usize, sample_rate: u32) -> f64 {
        bin as f64 * sample_rate as f64 / self.fft_size as f64
    }

    /// Frequency axis in Hz, k * sample_rate / n
    pub fn frequency_axis_hz(&self, sample_rate: u32) -> Vec<f64> {
        (0..self.num_bins())
            .map(|bin| self.bin_to_hz(bin, sample_rate))
            .collect()
    }
}
