//! Files on disk: trial folders of WAV clips and the CSV tables between stages

pub mod dataset;
pub mod tables;

pub use dataset::{discover_trials, trial_recordings, DirectorySource};

use crate::audio::{FanSpeed, Recording};
use crate::error::Result;

/// Where the recording of a (trial, fan speed) pair comes from
///
/// Implementations must be shareable across worker threads.
pub trait RecordingSource: Sync {
    /// Load one recording
    ///
    /// # Errors
    /// `MissingFile` when the trial never recorded that speed
    fn load(&self, trial: &str, speed: FanSpeed) -> Result<Recording>;
}
