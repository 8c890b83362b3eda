//! End-to-end batch: analyze -> aggregate volumes -> select spectra -> bin -> calibrate
//!
//! Each stage reads the previous stage's output and writes its own table, so
//! stages can also be rerun one at a time from the CLI.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::aggregate::selection::{SkippedSpeed, SkippedTrial};
use crate::aggregate::{
    AggregationReport, CalibratedMatrix, CalibrationMode, CalibrationReference, Calibrator,
    SelectionOutcome, SpectraSelector, VolumeAggregator, VolumeRecord, VolumeTable,
};
use crate::audio::{FanSpeed, Recording};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::spectrum::{BinnedSpectrumMatrix, FrequencyBinner, SpectralAnalyzer, SpectralSample};
use crate::storage::tables::{self, CALIBRATED_FILE, SPECTRA_FILE, TRIAL_RESULTS_FILE, VOLUMES_FILE};
use crate::storage::{discover_trials, trial_recordings, DirectorySource};

/// Average volumes measured in one trial folder
#[derive(Debug, Clone, PartialEq)]
pub struct TrialAnalysis {
    pub trial: String,

    /// (fan speed, average volume), ascending by speed
    pub volumes: Vec<(FanSpeed, f64)>,

    /// Recordings that could not be analyzed
    pub skipped: Vec<PathBuf>,
}

/// Analyze every recording in a trial folder
///
/// Recordings are analyzed in parallel and merged in fan-speed order.
/// Unreadable recordings are logged and left out.
pub fn analyze_trial(trial_dir: &Path, analyzer: &SpectralAnalyzer) -> Result<TrialAnalysis> {
    let trial = trial_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| trial_dir.display().to_string());

    let recordings = trial_recordings(trial_dir)?;

    let results: Vec<(FanSpeed, PathBuf, Result<f64>)> = recordings
        .into_par_iter()
        .map(|(speed, path)| {
            debug!("Analyzing recording for fan speed {}: {}", speed, path.display());
            let volume = Recording::open(&path)
                .and_then(|rec| analyzer.analyze(&rec))
                .map(|sample| sample.average_volume);
            (speed, path, volume)
        })
        .collect();

    let mut volumes = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (speed, path, volume) in results {
        match volume {
            Ok(volume) => volumes.push((speed, volume)),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped.push(path);
            }
        }
    }

    Ok(TrialAnalysis {
        trial,
        volumes,
        skipped,
    })
}

/// Drop a results table the current analysis could not back up
fn remove_stale_results(results: &Path) {
    if results.is_file() {
        match fs::remove_file(results) {
            Ok(()) => debug!("Removed stale {}", results.display()),
            Err(e) => warn!("Cannot remove stale {}: {}", results.display(), e),
        }
    }
}

/// What a run included and what it had to leave out
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub trials_included: Vec<String>,
    pub trials_skipped: Vec<(String, String)>,
    pub volumes: AggregationReport,
    pub speeds_included: Vec<FanSpeed>,
    pub speeds_skipped: Vec<SkippedSpeed>,
    pub recordings_skipped: Vec<SkippedTrial>,

    /// Recordings that failed to decode or analyze during per-trial analysis
    pub recordings_unreadable: Vec<PathBuf>,
}

impl PipelineReport {
    pub fn log_summary(&self) {
        info!(
            "Trials: {} included, {} skipped",
            self.trials_included.len(),
            self.trials_skipped.len()
        );
        for (trial, reason) in &self.trials_skipped {
            info!("  skipped trial '{}': {}", trial, reason);
        }
        info!(
            "Volume records: {} accepted, {} skipped",
            self.volumes.accepted,
            self.volumes.skipped()
        );
        info!(
            "Fan speeds: {} included, {} skipped",
            self.speeds_included.len(),
            self.speeds_skipped.len()
        );
        for skipped in &self.speeds_skipped {
            info!("  skipped fan speed {}: {}", skipped.speed, skipped.reason);
        }
        if !self.recordings_unreadable.is_empty() {
            info!("Unreadable recordings: {}", self.recordings_unreadable.len());
            for path in &self.recordings_unreadable {
                debug!("  unreadable: {}", path.display());
            }
        }
        if !self.recordings_skipped.is_empty() {
            info!("Selected recordings left out: {}", self.recordings_skipped.len());
        }
    }
}

/// Everything a full run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub volumes: VolumeTable,
    pub spectra: BinnedSpectrumMatrix,
    pub calibrated: CalibratedMatrix,
    pub report: PipelineReport,
}

/// Configured batch pipeline over one data directory
pub struct Pipeline {
    config: PipelineConfig,
    analyzer: SpectralAnalyzer,
    selector: SpectraSelector,
    calibrator: Calibrator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let selector = SpectraSelector::new(config.selection)?;
        let calibrator = Calibrator::new(config.calibration, config.epsilon)?;

        Ok(Self {
            config,
            analyzer: SpectralAnalyzer::new(),
            selector,
            calibrator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn output_path(&self, file: &str) -> Result<PathBuf> {
        let dir = self.config.output_dir();
        fs::create_dir_all(dir)?;
        Ok(dir.join(file))
    }

    /// Analyze the silence reference
    ///
    /// Returns `None` in absolute mode.
    ///
    /// # Errors
    /// `MissingReference` if relative mode is configured and the file is absent
    pub fn load_reference(&self) -> Result<Option<SpectralSample>> {
        if self.calibrator.mode() == CalibrationMode::Absolute {
            return Ok(None);
        }

        let path = self
            .config
            .reference
            .as_ref()
            .ok_or_else(|| AnalysisError::Config("no reference recording configured".to_string()))?;
        if !path.is_file() {
            return Err(AnalysisError::MissingReference(path.clone()));
        }

        let sample = self.analyzer.analyze(&Recording::open(path)?)?;
        info!(
            "Silence reference {}: average volume {:.4}",
            path.display(),
            sample.average_volume
        );
        Ok(Some(sample))
    }

    /// Stage 1: per-trial volumes, written to each trial's results table
    pub fn analyze_trials(&self) -> Result<(Vec<TrialAnalysis>, PipelineReport)> {
        let mut report = PipelineReport::default();
        let mut analyses = Vec::new();

        for trial in discover_trials(&self.config.data_dir)? {
            let trial_dir = self.config.data_dir.join(&trial);
            let results = trial_dir.join(TRIAL_RESULTS_FILE);

            let analysis = match analyze_trial(&trial_dir, &self.analyzer) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!("Skipping trial '{}': {}", trial, e);
                    remove_stale_results(&results);
                    report.trials_skipped.push((trial, e.to_string()));
                    continue;
                }
            };
            report.recordings_unreadable.extend(analysis.skipped.iter().cloned());

            if analysis.volumes.is_empty() {
                warn!("Trial '{}' has no usable recordings", trial);
                remove_stale_results(&results);
                report.trials_skipped.push((trial, "no usable recordings".to_string()));
                continue;
            }

            if let Err(e) = tables::write_trial_volumes(&results, &analysis.volumes) {
                warn!("Skipping trial '{}': cannot write {}: {}", trial, results.display(), e);
                report.trials_skipped.push((trial, e.to_string()));
                continue;
            }

            info!(
                "Finished analysis of '{}': {} recordings ({} skipped)",
                trial,
                analysis.volumes.len(),
                analysis.skipped.len()
            );
            report.trials_included.push(trial);
            analyses.push(analysis);
        }

        Ok((analyses, report))
    }

    /// Stage 2: collect every trial's results table into the cross-trial table
    pub fn aggregate_volumes(&self) -> Result<(VolumeTable, PipelineReport)> {
        let mut report = PipelineReport::default();
        let mut records: Vec<VolumeRecord> = Vec::new();

        for trial in discover_trials(&self.config.data_dir)? {
            let results = self.config.data_dir.join(&trial).join(TRIAL_RESULTS_FILE);
            if !results.is_file() {
                warn!("Skipping trial '{}': {} not found", trial, TRIAL_RESULTS_FILE);
                report
                    .trials_skipped
                    .push((trial, format!("{} not found", TRIAL_RESULTS_FILE)));
                continue;
            }

            match tables::read_trial_volumes(&results, &trial) {
                Ok(trial_records) => {
                    debug!("Found analysis file: {}", results.display());
                    records.extend(trial_records);
                    report.trials_included.push(trial);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", results.display(), e);
                    report.trials_skipped.push((trial, e.to_string()));
                }
            }
        }

        let table = self.write_volumes(&mut report, records)?;
        Ok((table, report))
    }

    /// Build the cross-trial table over `report.trials_included` and write it out
    fn write_volumes(&self, report: &mut PipelineReport, records: Vec<VolumeRecord>) -> Result<VolumeTable> {
        let (table, volume_report) =
            VolumeAggregator.aggregate(report.trials_included.iter().cloned(), records);
        report.volumes = volume_report;

        let path = self.output_path(VOLUMES_FILE)?;
        tables::write_volume_table(&path, &table)?;
        info!(
            "Aggregated {} fan speeds across {} trials into {}",
            table.num_speeds(),
            table.trials().len(),
            path.display()
        );

        Ok(table)
    }

    /// Stage 3: representative spectrum per speed
    pub fn select_spectra(&self, table: &VolumeTable) -> SelectionOutcome {
        let source = DirectorySource::new(&self.config.data_dir);
        self.selector.select(table, &source)
    }

    /// Binner for the configured cutoff, or one covering all selected spectra
    pub fn spectrum_binner(&self, outcome: &SelectionOutcome) -> Result<FrequencyBinner> {
        match self.config.max_frequency {
            Some(max) => FrequencyBinner::new(max),
            None => {
                let max = outcome
                    .spectra
                    .values()
                    .filter_map(|s| s.frequencies.last().copied())
                    .fold(0.0_f64, f64::max);
                FrequencyBinner::new(max)
            }
        }
    }

    /// Stage 4: put every representative spectrum on the integer-Hz axis
    pub fn bin_spectra(&self, outcome: &SelectionOutcome, binner: &FrequencyBinner) -> Result<BinnedSpectrumMatrix> {
        let mut binned = BTreeMap::new();
        for (&speed, spectrum) in &outcome.spectra {
            binned.insert(speed, binner.bin(&spectrum.frequencies, &spectrum.magnitudes)?);
        }

        let matrix = BinnedSpectrumMatrix::from_binned(&binned);
        let path = self.output_path(SPECTRA_FILE)?;
        tables::write_spectrum_matrix(&path, &matrix)?;
        info!("Spectrum data saved to {}", path.display());

        Ok(matrix)
    }

    /// Binner for the reference when the matrix was read back from disk
    pub fn reference_binner(&self, matrix: &BinnedSpectrumMatrix) -> Result<FrequencyBinner> {
        match self.config.max_frequency {
            Some(max) => FrequencyBinner::new(max),
            None => FrequencyBinner::new(matrix.num_bins().saturating_sub(1) as f64),
        }
    }

    /// Stage 5: decibels against the silence reference (or absolute)
    pub fn calibrate(
        &self,
        matrix: &BinnedSpectrumMatrix,
        reference: Option<&SpectralSample>,
        binner: &FrequencyBinner,
    ) -> Result<CalibratedMatrix> {
        let reference = reference
            .map(|sample| binner.bin(&sample.frequencies, &sample.magnitudes))
            .transpose()?
            .map(|binned| CalibrationReference::from_binned(&binned));

        let calibrated = self.calibrator.calibrate(matrix, reference.as_ref())?;

        let path = self.output_path(CALIBRATED_FILE)?;
        tables::write_calibrated(&path, &calibrated)?;
        info!("Calibrated spectra saved to {}", path.display());

        Ok(calibrated)
    }

    /// Run every stage in order
    ///
    /// The reference is checked first so a missing silence recording fails the
    /// run before any trial is touched. Volumes come straight from this run's
    /// analysis, never from results tables left on disk by earlier runs.
    pub fn run(&self) -> Result<PipelineOutput> {
        let reference = self.load_reference()?;

        let (analyses, mut report) = self.analyze_trials()?;
        let records: Vec<VolumeRecord> = analyses
            .iter()
            .flat_map(|analysis| {
                analysis
                    .volumes
                    .iter()
                    .map(move |&(speed, volume)| VolumeRecord::new(analysis.trial.as_str(), speed, volume))
            })
            .collect();
        let volumes = self.write_volumes(&mut report, records)?;

        let outcome = self.select_spectra(&volumes);
        let binner = self.spectrum_binner(&outcome)?;
        let spectra = self.bin_spectra(&outcome, &binner)?;
        let calibrated = self.calibrate(&spectra, reference.as_ref(), &binner)?;

        report.speeds_included = outcome.spectra.keys().copied().collect();
        report.speeds_skipped = outcome.skipped_speeds;
        report.recordings_skipped = outcome.skipped_trials;
        report.log_summary();

        Ok(PipelineOutput {
            volumes,
            spectra,
            calibrated,
            report,
        })
    }
}
