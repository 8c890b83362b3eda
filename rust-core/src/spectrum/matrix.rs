//! Integer-Hz spectra for all fan speeds side by side

use ndarray::{Array2, ArrayView1, Axis};
use std::collections::BTreeMap;

use super::binning::BinnedSpectrum;
use crate::audio::FanSpeed;

/// Rows are integer-Hz bins from 0, columns are fan speeds in ascending order
///
/// `None` marks a bin no source sample fell into.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedSpectrumMatrix {
    values: Array2<Option<f64>>,
    speeds: Vec<FanSpeed>,
}

impl BinnedSpectrumMatrix {
    /// Assemble from per-speed columns
    ///
    /// Shorter columns are padded with "no data" up to the longest one.
    pub fn from_columns(columns: BTreeMap<FanSpeed, Vec<Option<f64>>>) -> Self {
        let num_bins = columns.values().map(Vec::len).max().unwrap_or(0);
        let speeds: Vec<FanSpeed> = columns.keys().copied().collect();

        let mut values = Array2::from_elem((num_bins, speeds.len()), None);
        for (col, column) in columns.values().enumerate() {
            for (bin, &cell) in column.iter().enumerate() {
                values[[bin, col]] = cell;
            }
        }

        Self { values, speeds }
    }

    /// Assemble from binned spectra, taking each bin's average
    pub fn from_binned(spectra: &BTreeMap<FanSpeed, BinnedSpectrum>) -> Self {
        Self::from_columns(
            spectra
                .iter()
                .map(|(&speed, binned)| (speed, binned.averages()))
                .collect(),
        )
    }

    pub fn num_bins(&self) -> usize {
        self.values.nrows()
    }

    pub fn speeds(&self) -> &[FanSpeed] {
        &self.speeds
    }

    pub fn values(&self) -> &Array2<Option<f64>> {
        &self.values
    }

    pub fn get(&self, bin: usize, speed: FanSpeed) -> Option<f64> {
        let col = self.speeds.binary_search(&speed).ok()?;
        self.values.get([bin, col]).copied().flatten()
    }

    pub fn column(&self, speed: FanSpeed) -> Option<ArrayView1<'_, Option<f64>>> {
        let col = self.speeds.binary_search(&speed).ok()?;
        Some(self.values.index_axis(Axis(1), col))
    }

    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty() || self.values.nrows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed(v: u8) -> FanSpeed {
        FanSpeed::new(v).unwrap()
    }

    #[test]
    fn test_columns_sorted_and_padded() {
        let mut columns = BTreeMap::new();
        columns.insert(speed(80), vec![Some(1.0), None, Some(3.0)]);
        columns.insert(speed(20), vec![Some(0.5)]);

        let matrix = BinnedSpectrumMatrix::from_columns(columns);

        assert_eq!(matrix.speeds(), &[speed(20), speed(80)]);
        assert_eq!(matrix.num_bins(), 3);
        assert_eq!(matrix.get(0, speed(20)), Some(0.5));
        assert_eq!(matrix.get(2, speed(20)), None);
        assert_eq!(matrix.get(1, speed(80)), None);
        assert_eq!(matrix.get(2, speed(80)), Some(3.0));
        assert_eq!(matrix.get(0, speed(50)), None);
    }
}
