//! Fan-speed labels embedded in recording file names
//!
//! The recorder names every clip `audio_<speed>.wav`. Parsing is kept apart from
//! directory scanning so a bad name is a typed error, not a silent skip.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Highest fan-speed setpoint (percent)
pub const MAX_FAN_SPEED: u8 = 100;

static RECORDING_NAME: OnceLock<Regex> = OnceLock::new();

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("'{0}' is not a recording name (expected audio_<speed>.wav)")]
    NotARecording(String),

    #[error("Fan speed {speed} in '{name}' is outside 0-{max}", max = MAX_FAN_SPEED)]
    OutOfRange { name: String, speed: u64 },
}

/// Fan-speed control setpoint, 0-100 %
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FanSpeed(u8);

impl FanSpeed {
    pub fn new(value: u8) -> Option<Self> {
        (value <= MAX_FAN_SPEED).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extract the fan speed from a recording file name such as `audio_45.wav`
pub fn parse_fan_speed(name: &str) -> Result<FanSpeed, NameError> {
    let regex = RECORDING_NAME.get_or_init(|| {
        Regex::new(r"audio_(\d+)\.wav$").expect("recording name pattern is valid")
    });

    let captures = regex
        .captures(name)
        .ok_or_else(|| NameError::NotARecording(name.to_string()))?;

    // Digits only, but may still overflow u64 on absurd names
    let speed: u64 = captures[1]
        .parse()
        .map_err(|_| NameError::NotARecording(name.to_string()))?;

    u8::try_from(speed)
        .ok()
        .and_then(FanSpeed::new)
        .ok_or(NameError::OutOfRange {
            name: name.to_string(),
            speed,
        })
}

/// File name the recorder uses for a given speed
pub fn recording_file_name(speed: FanSpeed) -> String {
    format!("audio_{}.wav", speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_names() {
        assert_eq!(parse_fan_speed("audio_0.wav").unwrap().value(), 0);
        assert_eq!(parse_fan_speed("audio_45.wav").unwrap().value(), 45);
        assert_eq!(parse_fan_speed("audio_100.wav").unwrap().value(), 100);
    }

    #[test]
    fn test_parse_rejects_other_files() {
        assert!(matches!(
            parse_fan_speed("analysis_results.csv"),
            Err(NameError::NotARecording(_))
        ));
        assert!(matches!(
            parse_fan_speed("audio_.wav"),
            Err(NameError::NotARecording(_))
        ));
    }

    #[test]
    fn test_parse_out_of_range() {
        assert_eq!(
            parse_fan_speed("audio_101.wav"),
            Err(NameError::OutOfRange {
                name: "audio_101.wav".to_string(),
                speed: 101
            })
        );
    }

    #[test]
    fn test_file_name_round_trip() {
        let speed = FanSpeed::new(73).unwrap();
        assert_eq!(parse_fan_speed(&recording_file_name(speed)).unwrap(), speed);
    }
}
