//! Integer-Hz binning of FFT spectra
//!
//! FFT resolution depends on clip length, so spectra from clips of slightly
//! different durations never line up bin for bin. Collapsing every spectrum
//! onto 1 Hz bins gives all trials and fan speeds a common axis.

use crate::error::{AnalysisError, Result};

/// Highest cutoff a binner accepts, in Hz
///
/// Well above the Nyquist frequency of any audio sample rate; bins are
/// allocated up front, so the axis length has to stay bounded.
pub const MAX_BINNABLE_FREQUENCY: f64 = 1_000_000.0;

/// Summed magnitudes and sample counts per integer-Hz bin
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedSpectrum {
    sums: Vec<f64>,
    counts: Vec<usize>,
}

impl BinnedSpectrum {
    /// Number of bins (floor(max_frequency) + 1)
    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    pub fn sums(&self) -> &[f64] {
        &self.sums
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Mean magnitude of one bin, `None` when nothing fell into it
    pub fn average(&self, bin: usize) -> Option<f64> {
        match self.counts.get(bin) {
            Some(&count) if count > 0 => Some(self.sums[bin] / count as f64),
            _ => None,
        }
    }

    /// Mean magnitude per bin
    pub fn averages(&self) -> Vec<Option<f64>> {
        (0..self.len()).map(|bin| self.average(bin)).collect()
    }

    /// Number of bins holding at least one source sample
    pub fn populated_bins(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}

/// Collapses spectra onto integer-Hz bins up to a cutoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBinner {
    max_frequency: f64,
}

impl FrequencyBinner {
    /// # Errors
    /// `Config` if the cutoff is negative, not finite, or above
    /// `MAX_BINNABLE_FREQUENCY`
    pub fn new(max_frequency: f64) -> Result<Self> {
        if !max_frequency.is_finite() || max_frequency < 0.0 {
            return Err(AnalysisError::Config(format!(
                "max frequency must be a non-negative finite number, got {}",
                max_frequency
            )));
        }
        if max_frequency > MAX_BINNABLE_FREQUENCY {
            return Err(AnalysisError::Config(format!(
                "max frequency {} Hz exceeds the {} Hz limit",
                max_frequency, MAX_BINNABLE_FREQUENCY
            )));
        }
        Ok(Self { max_frequency })
    }

    /// Binner whose cutoff is the highest frequency present in `frequencies`
    pub fn covering(frequencies: &[f64]) -> Result<Self> {
        let max = frequencies
            .iter()
            .copied()
            .filter(|f| f.is_finite())
            .fold(0.0_f64, f64::max);
        Self::new(max)
    }

    pub fn max_frequency(&self) -> f64 {
        self.max_frequency
    }

    /// Number of output bins, floor(max_frequency) + 1
    pub fn num_bins(&self) -> usize {
        self.max_frequency.floor() as usize + 1
    }

    /// Bin `magnitudes` by floor(frequency)
    ///
    /// Samples above the cutoff (or at negative frequencies) are ignored.
    pub fn bin(&self, frequencies: &[f64], magnitudes: &[f64]) -> Result<BinnedSpectrum> {
        if frequencies.len() != magnitudes.len() {
            return Err(AnalysisError::LengthMismatch {
                frequencies: frequencies.len(),
                magnitudes: magnitudes.len(),
            });
        }

        let num_bins = self.num_bins();
        let mut sums = vec![0.0; num_bins];
        let mut counts = vec![0usize; num_bins];

        for (&freq, &magnitude) in frequencies.iter().zip(magnitudes) {
            if !(0.0..=self.max_frequency).contains(&freq) {
                continue;
            }
            let bin = freq.floor() as usize;
            if bin < num_bins {
                sums[bin] += magnitude;
                counts[bin] += 1;
            }
        }

        Ok(BinnedSpectrum { sums, counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_grid_is_reproduced_exactly() {
        let freqs: Vec<f64> = (0..=20).map(f64::from).collect();
        let mags: Vec<f64> = freqs.iter().map(|f| 0.1 * f + 0.003).collect();

        let binner = FrequencyBinner::new(20.0).unwrap();
        let binned = binner.bin(&freqs, &mags).unwrap();

        assert_eq!(binned.len(), 21);
        assert!(binned.counts().iter().all(|&c| c == 1));
        for (bin, &mag) in mags.iter().enumerate() {
            assert_eq!(binned.average(bin), Some(mag));
        }
    }

    #[test]
    fn test_fine_grid_is_averaged() {
        // 0.25 Hz resolution: four samples per bin
        let freqs: Vec<f64> = (0..12).map(|k| k as f64 * 0.25).collect();
        let mags: Vec<f64> = (0..12).map(|k| k as f64).collect();

        let binned = FrequencyBinner::new(2.75).unwrap().bin(&freqs, &mags).unwrap();

        assert_eq!(binned.len(), 3);
        assert_eq!(binned.counts(), &[4, 4, 4]);
        assert_eq!(binned.average(0), Some(1.5));
        assert_eq!(binned.average(1), Some(5.5));
        assert_eq!(binned.average(2), Some(9.5));
    }

    #[test]
    fn test_empty_bins_are_no_data() {
        // 2.5 Hz resolution leaves gaps on a 1 Hz axis
        let freqs = [0.0, 2.5, 5.0];
        let mags = [0.0, 1.0, 2.0];

        let binned = FrequencyBinner::new(5.0).unwrap().bin(&freqs, &mags).unwrap();

        assert_eq!(binned.average(0), Some(0.0));
        assert_eq!(binned.average(1), None);
        assert_eq!(binned.average(2), Some(1.0));
        assert_eq!(binned.average(3), None);
        assert_eq!(binned.average(5), Some(2.0));
        assert_eq!(binned.populated_bins(), 3);
    }

    #[test]
    fn test_cutoff_discards_higher_frequencies() {
        let freqs = [0.0, 1.0, 2.0, 3.5, 4.0];
        let mags = [1.0; 5];

        let binned = FrequencyBinner::new(3.5).unwrap().bin(&freqs, &mags).unwrap();

        assert_eq!(binned.len(), 4);
        assert_eq!(binned.counts(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_covering_uses_data_maximum() {
        let freqs = [0.0, 10.0, 20.5];
        let binner = FrequencyBinner::covering(&freqs).unwrap();
        assert_eq!(binner.num_bins(), 21);
    }

    #[test]
    fn test_cutoff_bounds() {
        assert!(FrequencyBinner::new(MAX_BINNABLE_FREQUENCY).is_ok());
        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e15] {
            assert!(matches!(FrequencyBinner::new(bad), Err(AnalysisError::Config(_))));
        }
    }

    #[test]
    fn test_length_mismatch() {
        let binner = FrequencyBinner::new(10.0).unwrap();
        assert!(matches!(
            binner.bin(&[0.0, 1.0], &[1.0]),
            Err(AnalysisError::LengthMismatch { .. })
        ));
    }
}
