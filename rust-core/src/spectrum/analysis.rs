//! Whole-recording spectral analysis
//!
//! Turns one recording into its average volume and normalized one-sided spectrum.

use std::fmt;

use super::fft::FftEngine;
use crate::audio::Recording;
use crate::error::{AnalysisError, Result};

/// Frequency grid of a one-sided spectrum
///
/// Two spectra can be averaged element-wise only when their grids are equal,
/// i.e. they share sample rate and sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyGrid {
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl FrequencyGrid {
    /// Number of one-sided bins, floor(n/2) + 1
    pub fn num_bins(&self) -> usize {
        self.sample_count / 2 + 1
    }

    /// Bin spacing in Hz
    pub fn resolution_hz(&self) -> f64 {
        self.sample_rate as f64 / self.sample_count as f64
    }
}

impl fmt::Display for FrequencyGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} samples @ {} Hz", self.sample_count, self.sample_rate)
    }
}

/// Analysis result for one recording
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSample {
    /// Mean absolute amplitude of the mono samples
    pub average_volume: f64,

    /// Bin frequencies in Hz, strictly increasing from 0
    pub frequencies: Vec<f64>,

    /// |FFT| / n per bin
    pub magnitudes: Vec<f64>,

    pub grid: FrequencyGrid,
}

/// Average volume and magnitude spectrum of whole recordings
///
/// Holds no state between calls; safe to share across worker threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralAnalyzer;

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a decoded recording
    pub fn analyze(&self, recording: &Recording) -> Result<SpectralSample> {
        self.analyze_samples(recording.samples(), recording.sample_rate())
    }

    /// Analyze raw mono samples
    ///
    /// # Errors
    /// `InvalidAudio` for an empty signal or zero sample rate
    pub fn analyze_samples(&self, samples: &[f64], sample_rate: u32) -> Result<SpectralSample> {
        if samples.is_empty() {
            return Err(AnalysisError::invalid_audio("recording contains no samples"));
        }
        if sample_rate == 0 {
            return Err(AnalysisError::invalid_audio("sample rate must be positive"));
        }

        let n = samples.len();
        let average_volume = samples.iter().map(|s| s.abs()).sum::<f64>() / n as f64;

        let mut engine = FftEngine::new(n);
        let magnitudes: Vec<f64> = engine
            .compute_magnitude(samples)?
            .into_iter()
            .map(|mag| mag / n as f64)
            .collect();
        let frequencies = engine.frequency_axis_hz(sample_rate);

        Ok(SpectralSample {
            average_volume,
            frequencies,
            magnitudes,
            grid: FrequencyGrid {
                sample_rate,
                sample_count: n,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_frequency_axis_shape() {
        let analyzer = SpectralAnalyzer::new();

        for &(n, rate) in &[(1000usize, 8000u32), (1001, 44100), (2, 100)] {
            let signal: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
            let sample = analyzer.analyze_samples(&signal, rate).unwrap();

            assert_eq!(sample.frequencies.len(), n / 2 + 1);
            assert_eq!(sample.magnitudes.len(), sample.frequencies.len());
            assert_eq!(sample.frequencies[0], 0.0);
            assert!(sample.frequencies.windows(2).all(|w| w[1] > w[0]));

            let last = *sample.frequencies.last().unwrap();
            let nyquist = rate as f64 / 2.0;
            assert!(last <= nyquist + 1e-9);
            assert!(nyquist - last <= sample.grid.resolution_hz());
        }
    }

    #[test]
    fn test_silence_is_all_zero() {
        let analyzer = SpectralAnalyzer::new();
        let sample = analyzer.analyze_samples(&vec![0.0; 4410], 44100).unwrap();

        assert_eq!(sample.average_volume, 0.0);
        assert!(sample.magnitudes.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_average_volume_is_mean_absolute() {
        let analyzer = SpectralAnalyzer::new();
        let sample = analyzer.analyze_samples(&[1.0, -3.0, 2.0, -2.0], 4).unwrap();
        assert!((sample.average_volume - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sine_magnitude_is_normalized() {
        let analyzer = SpectralAnalyzer::new();
        let rate = 1000;
        let signal: Vec<f64> = (0..1000)
            .map(|n| 4.0 * (2.0 * PI * 125.0 * n as f64 / rate as f64).sin())
            .collect();

        let sample = analyzer.analyze_samples(&signal, rate).unwrap();

        // Amplitude A splits into A/2 on each side of a one-sided |FFT|/n
        assert!((sample.magnitudes[125] - 2.0).abs() < 1e-9);
        assert!((sample.frequencies[125] - 125.0).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let analyzer = SpectralAnalyzer::new();
        let signal: Vec<f64> = (0..777).map(|i| ((i * 31 % 17) as f64) - 8.0).collect();
        let a = analyzer.analyze_samples(&signal, 22050).unwrap();
        let b = analyzer.analyze_samples(&signal, 22050).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_input() {
        let analyzer = SpectralAnalyzer::new();
        assert!(matches!(
            analyzer.analyze_samples(&[], 44100),
            Err(AnalysisError::InvalidAudio { .. })
        ));
        assert!(matches!(
            analyzer.analyze_samples(&[1.0], 0),
            Err(AnalysisError::InvalidAudio { .. })
        ));
    }
}
