//! Representative spectrum per fan speed
//!
//! Ambient noise (HVAC, traffic, mains hum) only ever adds energy, so the quietest
//! trials at a speed are the least contaminated estimate of the fan itself.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error, info, warn};

use super::volume::VolumeTable;
use crate::audio::FanSpeed;
use crate::error::{AnalysisError, Result};
use crate::spectrum::{FrequencyGrid, SpectralAnalyzer, SpectralSample};
use crate::storage::RecordingSource;

/// How trials are chosen for each fan speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionMode {
    /// Single quietest trial, spectrum taken as-is
    Lowest,

    /// Element-wise mean over the `count` quietest trials
    QuietestAverage { count: usize },
}

impl SelectionMode {
    /// Upper bound on trials contributing to one speed
    pub fn max_trials(&self) -> usize {
        match self {
            SelectionMode::Lowest => 1,
            SelectionMode::QuietestAverage { count } => *count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SelectionMode::QuietestAverage { count: 0 } => Err(AnalysisError::Config(
                "selection count must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Lowest => write!(f, "lowest"),
            SelectionMode::QuietestAverage { count } => write!(f, "quietest-{} average", count),
        }
    }
}

/// Averaged spectrum standing for one fan speed
#[derive(Debug, Clone, PartialEq)]
pub struct RepresentativeSpectrum {
    pub speed: FanSpeed,

    /// Trials that contributed, quietest first
    pub trials: Vec<String>,

    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub grid: FrequencyGrid,
}

/// Why a fan speed has no representative spectrum
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Every selected trial was missing or unreadable
    NoUsableTrials,

    /// Selected trials disagree on the frequency grid
    InconsistentGrid(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoUsableTrials => write!(f, "no usable trials"),
            SkipReason::InconsistentGrid(detail) => write!(f, "{}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSpeed {
    pub speed: FanSpeed,
    pub reason: SkipReason,
}

/// A selected trial whose recording could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTrial {
    pub speed: FanSpeed,
    pub trial: String,
    pub reason: String,
}

/// Everything the selector produced, plus what it had to leave out
#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    pub spectra: BTreeMap<FanSpeed, RepresentativeSpectrum>,
    pub skipped_speeds: Vec<SkippedSpeed>,
    pub skipped_trials: Vec<SkippedTrial>,
}

/// Picks and averages representative spectra per fan speed
#[derive(Debug, Clone, Copy)]
pub struct SpectraSelector {
    mode: SelectionMode,
    analyzer: SpectralAnalyzer,
}

impl SpectraSelector {
    pub fn new(mode: SelectionMode) -> Result<Self> {
        mode.validate()?;
        Ok(Self {
            mode,
            analyzer: SpectralAnalyzer::new(),
        })
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Quietest trials of one speed, at most `max_trials`
    ///
    /// Ties on volume are broken by trial name, so the result never depends on
    /// the order trials were scanned in.
    pub fn rank_trials<'a>(&self, table: &'a VolumeTable, speed: FanSpeed) -> Vec<(&'a str, f64)> {
        let mut ranked: Vec<(&str, f64)> = table.entries(speed).collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.mode.max_trials());
        ranked
    }

    /// Build representative spectra for every speed in `table`
    ///
    /// Speeds are processed in parallel; results are merged once all are done.
    pub fn select<S: RecordingSource>(&self, table: &VolumeTable, source: &S) -> SelectionOutcome {
        let speeds: Vec<FanSpeed> = table.speeds().collect();

        let results: Vec<(FanSpeed, SpeedResult)> = speeds
            .par_iter()
            .map(|&speed| (speed, self.select_speed(table, speed, source)))
            .collect();

        let mut outcome = SelectionOutcome::default();
        for (speed, result) in results {
            outcome.skipped_trials.extend(result.skipped_trials);
            match result.spectrum {
                Ok(spectrum) => {
                    outcome.spectra.insert(speed, spectrum);
                }
                Err(reason) => outcome.skipped_speeds.push(SkippedSpeed { speed, reason }),
            }
        }

        info!(
            "Selected {} representative spectra ({}), skipped {} speeds",
            outcome.spectra.len(),
            self.mode,
            outcome.skipped_speeds.len()
        );
        outcome
    }

    fn select_speed<S: RecordingSource>(
        &self,
        table: &VolumeTable,
        speed: FanSpeed,
        source: &S,
    ) -> SpeedResult {
        let mut skipped_trials = Vec::new();
        let mut analyzed: Vec<(String, SpectralSample)> = Vec::new();

        for (trial, volume) in self.rank_trials(table, speed) {
            debug!("Fan speed {}: trial '{}' (volume {:.4})", speed, trial, volume);

            let sample = source
                .load(trial, speed)
                .and_then(|recording| self.analyzer.analyze(&recording));

            match sample {
                Ok(sample) => analyzed.push((trial.to_string(), sample)),
                Err(e) => {
                    warn!("Fan speed {}: skipping trial '{}': {}", speed, trial, e);
                    skipped_trials.push(SkippedTrial {
                        speed,
                        trial: trial.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let spectrum = match average_spectra(speed, analyzed) {
            Ok(Some(spectrum)) => Ok(spectrum),
            Ok(None) => {
                warn!("Fan speed {}: no usable recordings, omitting", speed);
                Err(SkipReason::NoUsableTrials)
            }
            Err(e) => {
                error!("Fan speed {}: {}", speed, e);
                Err(SkipReason::InconsistentGrid(e.to_string()))
            }
        };

        SpeedResult {
            spectrum,
            skipped_trials,
        }
    }
}

struct SpeedResult {
    spectrum: std::result::Result<RepresentativeSpectrum, SkipReason>,
    skipped_trials: Vec<SkippedTrial>,
}

/// Element-wise mean of spectra sharing one frequency grid
///
/// Returns `Ok(None)` when there is nothing to average.
fn average_spectra(
    speed: FanSpeed,
    analyzed: Vec<(String, SpectralSample)>,
) -> Result<Option<RepresentativeSpectrum>> {
    let mut iter = analyzed.into_iter();
    let Some((first_trial, first)) = iter.next() else {
        return Ok(None);
    };

    let grid = first.grid;
    let frequencies = first.frequencies;
    let mut sums = first.magnitudes;
    let mut trials = vec![first_trial];

    for (trial, sample) in iter {
        if sample.grid != grid {
            return Err(AnalysisError::InconsistentGrid {
                speed: speed.value(),
                trial,
                expected: grid.to_string(),
                found: sample.grid.to_string(),
            });
        }
        for (sum, mag) in sums.iter_mut().zip(&sample.magnitudes) {
            *sum += mag;
        }
        trials.push(trial);
    }

    let count = trials.len() as f64;
    let magnitudes = if trials.len() == 1 {
        sums
    } else {
        sums.into_iter().map(|s| s / count).collect()
    };

    Ok(Some(RepresentativeSpectrum {
        speed,
        trials,
        frequencies,
        magnitudes,
        grid,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::volume::{VolumeAggregator, VolumeRecord};
    use crate::audio::Recording;
    use std::collections::HashMap;

    struct MemorySource {
        recordings: HashMap<(String, u8), Recording>,
    }

    impl MemorySource {
        fn new() -> Self {
            Self {
                recordings: HashMap::new(),
            }
        }

        fn with(mut self, trial: &str, speed: u8, samples: Vec<f64>, rate: u32) -> Self {
            let recording = Recording::new(rate, samples, FanSpeed::new(speed)).unwrap();
            self.recordings.insert((trial.to_string(), speed), recording);
            self
        }
    }

    impl RecordingSource for MemorySource {
        fn load(&self, trial: &str, speed: FanSpeed) -> Result<Recording> {
            self.recordings
                .get(&(trial.to_string(), speed.value()))
                .cloned()
                .ok_or_else(|| AnalysisError::MissingFile(format!("{}/audio_{}.wav", trial, speed).into()))
        }
    }

    fn speed(v: u8) -> FanSpeed {
        FanSpeed::new(v).unwrap()
    }

    fn signal_a() -> Vec<f64> {
        (0..64).map(|i| ((i * 7 % 13) as f64) - 6.0).collect()
    }

    fn signal_b() -> Vec<f64> {
        (0..64).map(|i| ((i * 5 % 11) as f64) * 0.5 - 2.0).collect()
    }

    fn two_trial_table(records: Vec<VolumeRecord>) -> VolumeTable {
        VolumeAggregator.aggregate(Vec::<String>::new(), records).0
    }

    #[test]
    fn test_quietest_one_picks_quietest_trial_unchanged() {
        let source = MemorySource::new()
            .with("A", 50, signal_a(), 1000)
            .with("B", 50, signal_b(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(50), 0.10),
            VolumeRecord::new("B", speed(50), 0.05),
        ]);

        let selector = SpectraSelector::new(SelectionMode::QuietestAverage { count: 1 }).unwrap();
        let outcome = selector.select(&table, &source);

        let expected = SpectralAnalyzer::new().analyze_samples(&signal_b(), 1000).unwrap();
        let spectrum = &outcome.spectra[&speed(50)];
        assert_eq!(spectrum.trials, vec!["B".to_string()]);
        assert_eq!(spectrum.magnitudes, expected.magnitudes);
        assert_eq!(spectrum.frequencies, expected.frequencies);
    }

    #[test]
    fn test_quietest_two_averages_both_trials() {
        let source = MemorySource::new()
            .with("A", 50, signal_a(), 1000)
            .with("B", 50, signal_b(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(50), 0.10),
            VolumeRecord::new("B", speed(50), 0.05),
        ]);

        let selector = SpectraSelector::new(SelectionMode::QuietestAverage { count: 2 }).unwrap();
        let outcome = selector.select(&table, &source);

        let analyzer = SpectralAnalyzer::new();
        let a = analyzer.analyze_samples(&signal_a(), 1000).unwrap();
        let b = analyzer.analyze_samples(&signal_b(), 1000).unwrap();
        let spectrum = &outcome.spectra[&speed(50)];

        assert_eq!(spectrum.trials, vec!["B".to_string(), "A".to_string()]);
        for (i, &mag) in spectrum.magnitudes.iter().enumerate() {
            assert!((mag - (a.magnitudes[i] + b.magnitudes[i]) / 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lowest_mode_matches_quietest_one() {
        let source = MemorySource::new()
            .with("A", 50, signal_a(), 1000)
            .with("B", 50, signal_b(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(50), 0.10),
            VolumeRecord::new("B", speed(50), 0.05),
        ]);

        let lowest = SpectraSelector::new(SelectionMode::Lowest).unwrap().select(&table, &source);
        let quietest = SpectraSelector::new(SelectionMode::QuietestAverage { count: 1 })
            .unwrap()
            .select(&table, &source);

        assert_eq!(lowest.spectra, quietest.spectra);
    }

    #[test]
    fn test_selection_is_independent_of_trial_order() {
        let source = MemorySource::new()
            .with("A", 30, signal_a(), 1000)
            .with("B", 30, signal_b(), 1000)
            .with("C", 30, signal_a().iter().map(|s| s * 2.0).collect(), 1000);

        let records = vec![
            VolumeRecord::new("A", speed(30), 0.3),
            VolumeRecord::new("B", speed(30), 0.1),
            VolumeRecord::new("C", speed(30), 0.2),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let selector = SpectraSelector::new(SelectionMode::QuietestAverage { count: 2 }).unwrap();
        let forward = selector.select(&two_trial_table(records), &source);
        let backward = selector.select(&two_trial_table(reversed), &source);

        assert_eq!(forward.spectra, backward.spectra);
        assert_eq!(forward.spectra[&speed(30)].trials, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_count_beyond_available_equals_full_average() {
        let source = MemorySource::new()
            .with("A", 70, signal_a(), 1000)
            .with("B", 70, signal_b(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(70), 0.2),
            VolumeRecord::new("B", speed(70), 0.1),
        ]);

        let full = SpectraSelector::new(SelectionMode::QuietestAverage { count: 2 })
            .unwrap()
            .select(&table, &source);
        let generous = SpectraSelector::new(SelectionMode::QuietestAverage { count: 10 })
            .unwrap()
            .select(&table, &source);

        assert_eq!(full.spectra, generous.spectra);
    }

    #[test]
    fn test_missing_recording_omits_speed_without_failing() {
        let source = MemorySource::new().with("A", 40, signal_a(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(40), 0.2),
            VolumeRecord::new("A", speed(60), 0.3),
        ]);

        let outcome = SpectraSelector::new(SelectionMode::Lowest).unwrap().select(&table, &source);

        assert!(outcome.spectra.contains_key(&speed(40)));
        assert!(!outcome.spectra.contains_key(&speed(60)));
        assert_eq!(
            outcome.skipped_speeds,
            vec![SkippedSpeed {
                speed: speed(60),
                reason: SkipReason::NoUsableTrials
            }]
        );
        assert_eq!(outcome.skipped_trials.len(), 1);
        assert_eq!(outcome.skipped_trials[0].trial, "A");
    }

    #[test]
    fn test_missing_trial_is_skipped_and_rest_averaged() {
        let source = MemorySource::new().with("B", 50, signal_b(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(50), 0.01),
            VolumeRecord::new("B", speed(50), 0.05),
        ]);

        let outcome = SpectraSelector::new(SelectionMode::QuietestAverage { count: 2 })
            .unwrap()
            .select(&table, &source);

        assert_eq!(outcome.spectra[&speed(50)].trials, vec!["B".to_string()]);
        assert_eq!(outcome.skipped_trials.len(), 1);
    }

    #[test]
    fn test_inconsistent_grid_aborts_only_that_speed() {
        let source = MemorySource::new()
            .with("A", 50, signal_a(), 1000)
            .with("B", 50, signal_b()[..60].to_vec(), 1000)
            .with("A", 80, signal_a(), 1000);
        let table = two_trial_table(vec![
            VolumeRecord::new("A", speed(50), 0.10),
            VolumeRecord::new("B", speed(50), 0.05),
            VolumeRecord::new("A", speed(80), 0.10),
        ]);

        let outcome = SpectraSelector::new(SelectionMode::QuietestAverage { count: 3 })
            .unwrap()
            .select(&table, &source);

        assert!(!outcome.spectra.contains_key(&speed(50)));
        assert!(outcome.spectra.contains_key(&speed(80)));
        assert!(matches!(
            outcome.skipped_speeds[0].reason,
            SkipReason::InconsistentGrid(_)
        ));
    }

    #[test]
    fn test_zero_count_is_rejected() {
        assert!(SpectraSelector::new(SelectionMode::QuietestAverage { count: 0 }).is_err());
    }
}
