//! Immutable mono recordings decoded from WAV clips

use hound::{SampleFormat, WavReader};
use std::path::Path;

use super::naming::{parse_fan_speed, FanSpeed};
use crate::error::{AnalysisError, Result};

/// One recorded clip, reduced to mono
///
/// Integer PCM keeps its raw integer scale so volumes stay comparable with the
/// recorder's own units.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    sample_rate: u32,
    samples: Vec<f64>,
    speed: Option<FanSpeed>,
}

impl Recording {
    /// Create a mono recording
    ///
    /// # Errors
    /// `InvalidAudio` if there are no samples or the sample rate is zero
    pub fn new(sample_rate: u32, samples: Vec<f64>, speed: Option<FanSpeed>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::invalid_audio("sample rate must be positive"));
        }
        if samples.is_empty() {
            return Err(AnalysisError::invalid_audio("recording contains no samples"));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(AnalysisError::invalid_audio("recording contains non-finite samples"));
        }

        Ok(Self {
            sample_rate,
            samples,
            speed,
        })
    }

    /// Create a recording from interleaved frames, averaging channels to mono
    pub fn from_interleaved(
        sample_rate: u32,
        channels: u16,
        interleaved: &[f64],
        speed: Option<FanSpeed>,
    ) -> Result<Self> {
        let mono = downmix(interleaved, channels)?;
        Self::new(sample_rate, mono, speed)
    }

    /// Decode a WAV file
    ///
    /// The fan speed is taken from the file name when it follows the
    /// `audio_<speed>.wav` convention; otherwise the recording is unlabelled
    /// (as for the silence reference).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AnalysisError::MissingFile(path.to_path_buf()));
        }

        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let interleaved: Vec<f64> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => reader
                .samples::<i32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()?,
        };

        let speed = path
            .file_name()
            .and_then(|name| parse_fan_speed(&name.to_string_lossy()).ok());

        Self::from_interleaved(spec.sample_rate, spec.channels, &interleaved, speed)
            .map_err(|e| e.with_path(path))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn speed(&self) -> Option<FanSpeed> {
        self.speed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Average interleaved channels into a single mono channel
fn downmix(interleaved: &[f64], channels: u16) -> Result<Vec<f64>> {
    match channels {
        0 => Err(AnalysisError::invalid_audio("recording declares zero channels")),
        1 => Ok(interleaved.to_vec()),
        n => {
            let n = n as usize;
            if interleaved.len() % n != 0 {
                return Err(AnalysisError::invalid_audio(format!(
                    "{} samples do not form whole {}-channel frames",
                    interleaved.len(),
                    n
                )));
            }
            Ok(interleaved
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f64>() / n as f64)
                .collect())
        }
    }
}
