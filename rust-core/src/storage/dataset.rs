//! Trial folder discovery
//!
//! Layout written by the recorder: `<data_dir>/<trial>/audio_<speed>.wav`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::RecordingSource;
use crate::audio::{parse_fan_speed, recording_file_name, FanSpeed, NameError, Recording};
use crate::error::{AnalysisError, Result};

/// Recordings resolved under a data directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the recording of a (trial, speed) pair would have
    pub fn recording_path(&self, trial: &str, speed: FanSpeed) -> PathBuf {
        self.root.join(trial).join(recording_file_name(speed))
    }
}

impl RecordingSource for DirectorySource {
    fn load(&self, trial: &str, speed: FanSpeed) -> Result<Recording> {
        let path = self.recording_path(trial, speed);
        if !path.is_file() {
            return Err(AnalysisError::MissingFile(path));
        }
        Recording::open(&path)
    }
}

/// Trial folders under `data_dir`, sorted by name
///
/// # Errors
/// Fails if `data_dir` cannot be read
pub fn discover_trials(data_dir: &Path) -> Result<Vec<String>> {
    let mut trials: Vec<String> = fs::read_dir(data_dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            if !entry.file_type().ok()?.is_dir() {
                return None;
            }
            Some(entry.file_name().to_string_lossy().into_owned())
        })
        .collect();

    trials.sort();
    debug!("Found {} trial folders in {}", trials.len(), data_dir.display());
    Ok(trials)
}

/// Recordings in one trial folder, ordered by fan speed
///
/// Files that are not recordings are ignored; recordings whose speed is out of
/// range are skipped with a warning.
pub fn trial_recordings(trial_dir: &Path) -> Result<Vec<(FanSpeed, PathBuf)>> {
    let mut recordings = Vec::new();

    for entry in fs::read_dir(trial_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        match parse_fan_speed(&name) {
            Ok(speed) => recordings.push((speed, path)),
            Err(NameError::NotARecording(_)) => {}
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    recordings.sort_by_key(|(speed, _)| *speed);
    Ok(recordings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fan-acoustics-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_discover_trials_sorted_dirs_only() {
        let root = scratch_dir("discover");
        fs::create_dir(root.join("Recordings_2")).unwrap();
        fs::create_dir(root.join("Recordings_1")).unwrap();
        fs::write(root.join("all_volumes.csv"), "Fan Speed\n").unwrap();

        let trials = discover_trials(&root).unwrap();
        assert_eq!(trials, vec!["Recordings_1".to_string(), "Recordings_2".to_string()]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_trial_recordings_filters_and_orders() {
        let dir = scratch_dir("listing");
        for name in ["audio_50.wav", "audio_5.wav", "audio_250.wav", "analysis_results.csv"] {
            fs::write(dir.join(name), b"").unwrap();
        }

        let speeds: Vec<u8> = trial_recordings(&dir)
            .unwrap()
            .into_iter()
            .map(|(s, _)| s.value())
            .collect();
        assert_eq!(speeds, vec![5, 50]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_recording_is_missing_file() {
        let root = scratch_dir("missing");
        let source = DirectorySource::new(&root);
        let result = source.load("trial", FanSpeed::new(10).unwrap());
        assert!(matches!(result, Err(AnalysisError::MissingFile(p)) if p.ends_with("trial/audio_10.wav")));

        fs::remove_dir_all(&root).ok();
    }
}
