//! Cross-trial aggregation: volume table, spectrum selection, calibration

pub mod calibration;
pub mod selection;
pub mod volume;

pub use calibration::{CalibratedMatrix, CalibrationMode, CalibrationReference, Calibrator, DEFAULT_EPSILON};
pub use selection::{RepresentativeSpectrum, SelectionMode, SelectionOutcome, SkipReason, SpectraSelector};
pub use volume::{AggregationReport, VolumeAggregator, VolumeRecord, VolumeStatistics, VolumeTable, VolumeTableBuilder};
