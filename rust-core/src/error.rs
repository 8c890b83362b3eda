//! Error taxonomy shared by every pipeline stage

use std::path::PathBuf;
use thiserror::Error;

use crate::audio::naming::NameError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid audio{}: {reason}", source_suffix(.path))]
    InvalidAudio {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("Recording not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Table {} is missing required column '{column}'", .path.display())]
    Schema { path: PathBuf, column: String },

    #[error("Frequency grid mismatch at fan speed {speed}: trial '{trial}' has {found} (expected {expected})")]
    InconsistentGrid {
        speed: u8,
        trial: String,
        expected: String,
        found: String,
    },

    #[error("Frequency and magnitude sequences differ in length ({frequencies} vs {magnitudes})")]
    LengthMismatch {
        frequencies: usize,
        magnitudes: usize,
    },

    #[error("Silence reference recording not found: {}", .0.display())]
    MissingReference(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("FFT processing failed: {0}")]
    Fft(String),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("WAV decoding error: {0}")]
    Wav(#[from] hound::Error),
}

fn source_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" in {}", p.display()),
        None => String::new(),
    }
}

impl AnalysisError {
    pub(crate) fn invalid_audio(reason: impl Into<String>) -> Self {
        AnalysisError::InvalidAudio {
            path: None,
            reason: reason.into(),
        }
    }

    /// Attach the offending file to an `InvalidAudio` error
    pub(crate) fn with_path(self, file: &std::path::Path) -> Self {
        match self {
            AnalysisError::InvalidAudio { path: None, reason } => AnalysisError::InvalidAudio {
                path: Some(file.to_path_buf()),
                reason,
            },
            other => other,
        }
    }

    /// Errors that only cost one data point; the batch carries on without it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidAudio { .. }
                | AnalysisError::MissingFile(_)
                | AnalysisError::Schema { .. }
                | AnalysisError::InconsistentGrid { .. }
                | AnalysisError::Wav(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
