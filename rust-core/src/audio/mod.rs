//! Recorded fan clips: file naming and WAV decoding

pub mod naming;
pub mod recording;

pub use naming::{parse_fan_speed, recording_file_name, FanSpeed, NameError};
pub use recording::Recording;
