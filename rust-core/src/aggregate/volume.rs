//! Cross-trial loudness table
//!
//! Collects per-trial average volumes into a (fan speed x trial) table. Trials are
//! expected to be incomplete: interrupted sessions simply leave cells missing.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::audio::FanSpeed;

/// One analyzed recording as reported by a trial
///
/// Fields are optional because per-trial tables come from disk and may carry
/// blank or malformed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub trial: Option<String>,
    pub speed: Option<FanSpeed>,
    pub average_volume: Option<f64>,
}

impl VolumeRecord {
    pub fn new(trial: impl Into<String>, speed: FanSpeed, average_volume: f64) -> Self {
        Self {
            trial: Some(trial.into()),
            speed: Some(speed),
            average_volume: Some(average_volume),
        }
    }
}

/// Counts of what went into a volume table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub accepted: usize,
    pub skipped_incomplete: usize,
    pub skipped_duplicate: usize,
}

impl AggregationReport {
    pub fn skipped(&self) -> usize {
        self.skipped_incomplete + self.skipped_duplicate
    }
}

/// Fan speed -> trial -> average volume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeTable {
    trials: Vec<String>,
    rows: BTreeMap<FanSpeed, BTreeMap<String, f64>>,
}

impl VolumeTable {
    /// Trial columns, sorted
    pub fn trials(&self) -> &[String] {
        &self.trials
    }

    /// Fan speeds with at least one volume, ascending
    pub fn speeds(&self) -> impl Iterator<Item = FanSpeed> + '_ {
        self.rows.keys().copied()
    }

    pub fn get(&self, speed: FanSpeed, trial: &str) -> Option<f64> {
        self.rows.get(&speed)?.get(trial).copied()
    }

    /// Present (trial, volume) cells of one fan speed
    pub fn entries(&self, speed: FanSpeed) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.rows
            .get(&speed)
            .into_iter()
            .flat_map(|row| row.iter().map(|(trial, &v)| (trial.as_str(), v)))
    }

    /// One row aligned with `trials()`, `None` for missing cells
    pub fn row(&self, speed: FanSpeed) -> Vec<Option<f64>> {
        self.trials
            .iter()
            .map(|trial| self.get(speed, trial))
            .collect()
    }

    pub fn num_speeds(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Per-speed spread of volumes across trials
    pub fn statistics(&self) -> Vec<VolumeStatistics> {
        self.rows
            .iter()
            .filter_map(|(&speed, row)| VolumeStatistics::from_volumes(speed, row.values().copied()))
            .collect()
    }
}

/// Accumulates records into a `VolumeTable`
///
/// The first volume seen for a (speed, trial) pair wins; later ones are skipped.
#[derive(Debug, Default)]
pub struct VolumeTableBuilder {
    trials: BTreeSet<String>,
    rows: BTreeMap<FanSpeed, BTreeMap<String, f64>>,
    report: AggregationReport,
}

impl VolumeTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trial column even if it ends up with no usable cells
    pub fn register_trial(&mut self, trial: impl Into<String>) -> &mut Self {
        self.trials.insert(trial.into());
        self
    }

    /// Add one record; returns whether it was accepted
    pub fn push(&mut self, record: VolumeRecord) -> bool {
        let (trial, speed, volume) = match (record.trial, record.speed, record.average_volume) {
            (Some(trial), Some(speed), Some(volume)) if volume.is_finite() => (trial, speed, volume),
            (trial, speed, volume) => {
                warn!(
                    "Skipping incomplete volume record (trial: {}, fan speed: {}, volume: {})",
                    trial.as_deref().unwrap_or("<missing>"),
                    speed.map(|s| s.to_string()).unwrap_or_else(|| "<missing>".into()),
                    volume.map(|v| v.to_string()).unwrap_or_else(|| "<missing>".into()),
                );
                self.report.skipped_incomplete += 1;
                return false;
            }
        };

        self.trials.insert(trial.clone());
        let row = self.rows.entry(speed).or_default();
        if row.contains_key(&trial) {
            warn!("Duplicate volume for fan speed {} in trial '{}', keeping the first", speed, trial);
            self.report.skipped_duplicate += 1;
            return false;
        }

        row.insert(trial, volume);
        self.report.accepted += 1;
        true
    }

    pub fn build(self) -> (VolumeTable, AggregationReport) {
        debug!(
            "Volume table: {} speeds x {} trials ({} accepted, {} skipped)",
            self.rows.len(),
            self.trials.len(),
            self.report.accepted,
            self.report.skipped()
        );
        (
            VolumeTable {
                trials: self.trials.into_iter().collect(),
                rows: self.rows,
            },
            self.report,
        )
    }
}

/// Builds the cross-trial volume table from per-trial analysis output
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeAggregator;

impl VolumeAggregator {
    /// Collect `records` into a table
    ///
    /// `trials` lists every trial that was scanned, so sparse trials still get a column.
    pub fn aggregate<I, T>(&self, trials: T, records: I) -> (VolumeTable, AggregationReport)
    where
        I: IntoIterator<Item = VolumeRecord>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let mut builder = VolumeTableBuilder::new();
        for trial in trials {
            builder.register_trial(trial);
        }
        for record in records {
            builder.push(record);
        }
        builder.build()
    }
}

/// Spread of one fan speed's volumes across trials
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStatistics {
    pub speed: FanSpeed,
    pub count: usize,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
}

impl VolumeStatistics {
    pub fn from_volumes(speed: FanSpeed, volumes: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = volumes.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            speed,
            count: sorted.len(),
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
        })
    }
}

/// Volume in dB (20 log10), `None` for non-positive volumes
pub fn volume_db(volume: f64) -> Option<f64> {
    (volume > 0.0).then(|| 20.0 * volume.log10())
}

/// Linear-interpolated quantile of sorted data
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
