//! CSV tables exchanged between pipeline stages
//!
//! Missing cells are written as empty fields and read back as "no data".

use csv::{ReaderBuilder, StringRecord, Writer};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::aggregate::{AggregationReport, CalibratedMatrix, VolumeRecord, VolumeTable, VolumeTableBuilder};
use crate::audio::FanSpeed;
use crate::error::{AnalysisError, Result};
use crate::spectrum::{BinnedSpectrumMatrix, MAX_BINNABLE_FREQUENCY};

pub const TRIAL_RESULTS_FILE: &str = "analysis_results.csv";
pub const VOLUMES_FILE: &str = "all_volumes.csv";
pub const SPECTRA_FILE: &str = "all_spectra.csv";
pub const CALIBRATED_FILE: &str = "calibrated_spectra.csv";

pub const VALUE_COLUMN: &str = "Value";
pub const VOLUME_COLUMN: &str = "Average Volume";
pub const FAN_SPEED_COLUMN: &str = "Fan Speed";
pub const FREQUENCY_COLUMN: &str = "Frequency (Hz)";

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_cell(field: &str) -> Option<f64> {
    field.trim().parse().ok()
}

fn parse_speed(field: &str) -> Option<FanSpeed> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0 && (0.0..=255.0).contains(v))
        .and_then(|v| FanSpeed::new(v as u8))
}

fn column_index(headers: &StringRecord, column: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| AnalysisError::Schema {
            path: path.to_path_buf(),
            column: column.to_string(),
        })
}

/// Write one trial's `Value, Average Volume` table
pub fn write_trial_volumes(path: &Path, rows: &[(FanSpeed, f64)]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([VALUE_COLUMN, VOLUME_COLUMN])?;
    for (speed, volume) in rows {
        writer.write_record([speed.to_string(), volume.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one trial's table as volume records tagged with `trial`
///
/// Blank or malformed cells become missing fields for the aggregator to skip.
///
/// # Errors
/// `Schema` when either required column is absent
pub fn read_trial_volumes(path: &Path, trial: &str) -> Result<Vec<VolumeRecord>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let value_idx = column_index(&headers, VALUE_COLUMN, path)?;
    let volume_idx = column_index(&headers, VOLUME_COLUMN, path)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(VolumeRecord {
            trial: Some(trial.to_string()),
            speed: row.get(value_idx).and_then(parse_speed),
            average_volume: row.get(volume_idx).and_then(parse_cell),
        });
    }
    Ok(records)
}

/// Write the cross-trial table: `Fan Speed` index, one column per trial
pub fn write_volume_table(path: &Path, table: &VolumeTable) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let header = std::iter::once(FAN_SPEED_COLUMN.to_string()).chain(table.trials().iter().cloned());
    writer.write_record(header)?;

    for speed in table.speeds() {
        let row = std::iter::once(speed.to_string()).chain(table.row(speed).into_iter().map(cell));
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the cross-trial table back
pub fn read_volume_table(path: &Path) -> Result<(VolumeTable, AggregationReport)> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let index = column_index(&headers, FAN_SPEED_COLUMN, path)?;

    let trials: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != index)
        .map(|(i, name)| (i, name.trim().to_string()))
        .collect();

    let mut builder = VolumeTableBuilder::new();
    for (_, trial) in &trials {
        builder.register_trial(trial.clone());
    }

    for row in reader.records() {
        let row = row?;
        let speed = row.get(index).and_then(parse_speed);
        if speed.is_none() {
            warn!("{}: skipping row with unreadable fan speed {:?}", path.display(), row.get(index));
            continue;
        }
        for (i, trial) in &trials {
            let field = row.get(*i).unwrap_or("").trim();
            if field.is_empty() {
                continue;
            }
            builder.push(VolumeRecord {
                trial: Some(trial.clone()),
                speed,
                average_volume: parse_cell(field),
            });
        }
    }

    Ok(builder.build())
}

/// Write a binned matrix: `Frequency (Hz)` index, one column per fan speed
pub fn write_spectrum_matrix(path: &Path, matrix: &BinnedSpectrumMatrix) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let header = std::iter::once(FREQUENCY_COLUMN.to_string()).chain(matrix.speeds().iter().map(|s| s.to_string()));
    writer.write_record(header)?;

    for (bin, row) in matrix.values().outer_iter().enumerate() {
        if row.iter().all(Option::is_none) {
            continue;
        }
        let record = std::iter::once(bin.to_string()).chain(row.iter().map(|&v| cell(v)));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a binned matrix back
///
/// Row labels are integer Hz; fractional labels are floored onto their bin,
/// keeping the first value seen for a bin. Rows labelled above
/// `MAX_BINNABLE_FREQUENCY` are skipped.
///
/// # Errors
/// `Schema` if the index column is missing or a column header is not a fan speed
pub fn read_spectrum_matrix(path: &Path) -> Result<BinnedSpectrumMatrix> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let index = column_index(&headers, FREQUENCY_COLUMN, path)?;

    let mut speed_columns = Vec::new();
    for (i, name) in headers.iter().enumerate() {
        if i == index {
            continue;
        }
        let speed = parse_speed(name).ok_or_else(|| AnalysisError::Schema {
            path: path.to_path_buf(),
            column: format!("fan speed (found '{}')", name),
        })?;
        speed_columns.push((i, speed));
    }

    let mut columns: BTreeMap<FanSpeed, Vec<Option<f64>>> =
        speed_columns.iter().map(|&(_, s)| (s, Vec::new())).collect();

    for row in reader.records() {
        let row = row?;
        let Some(freq) = row
            .get(index)
            .and_then(parse_cell)
            .filter(|f| (0.0..=MAX_BINNABLE_FREQUENCY).contains(f))
        else {
            warn!("{}: skipping row with unreadable frequency {:?}", path.display(), row.get(index));
            continue;
        };
        let bin = freq.floor() as usize;

        for &(i, speed) in &speed_columns {
            let column = columns.entry(speed).or_default();
            if column.len() <= bin {
                column.resize(bin + 1, None);
            }
            if column[bin].is_none() {
                column[bin] = row.get(i).and_then(parse_cell);
            }
        }
    }

    Ok(BinnedSpectrumMatrix::from_columns(columns))
}

/// Write the calibrated dB matrix with its retained frequency rows
pub fn write_calibrated(path: &Path, matrix: &CalibratedMatrix) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let header = std::iter::once(FREQUENCY_COLUMN.to_string()).chain(matrix.speeds().iter().map(|s| s.to_string()));
    writer.write_record(header)?;

    for (row, &freq) in matrix.values().outer_iter().zip(matrix.frequencies()) {
        let record = std::iter::once(freq.to_string()).chain(row.iter().map(|&v| cell(v)));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::VolumeAggregator;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fan-acoustics-tables-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn speed(v: u8) -> FanSpeed {
        FanSpeed::new(v).unwrap()
    }

    #[test]
    fn test_trial_table_schema_error() {
        let dir = scratch_dir("schema");
        let path = dir.join(TRIAL_RESULTS_FILE);
        fs::write(&path, "Value,Loudness\n10,0.5\n").unwrap();

        let err = read_trial_volumes(&path, "t1").unwrap_err();
        assert!(matches!(err, AnalysisError::Schema { ref column, .. } if column == VOLUME_COLUMN));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_trial_table_blank_cells_become_missing() {
        let dir = scratch_dir("blank");
        let path = dir.join(TRIAL_RESULTS_FILE);
        fs::write(&path, "Value,Average Volume\n10,0.5\n20,\nabc,0.7\n").unwrap();

        let records = read_trial_volumes(&path, "t1").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], VolumeRecord::new("t1", speed(10), 0.5));
        assert_eq!(records[1].average_volume, None);
        assert_eq!(records[2].speed, None);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_volume_table_keeps_missing_cells() {
        let dir = scratch_dir("volumes");
        let path = dir.join(VOLUMES_FILE);

        let (table, _) = VolumeAggregator.aggregate(
            ["t1", "t2"],
            vec![
                VolumeRecord::new("t1", speed(10), 0.25),
                VolumeRecord::new("t2", speed(20), 0.125),
            ],
        );
        write_volume_table(&path, &table).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Fan Speed,t1,t2\n10,0.25,\n20,,0.125\n");

        let (restored, report) = read_volume_table(&path).unwrap();
        assert_eq!(restored, table);
        assert_eq!(report.accepted, 2);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_spectrum_matrix_skips_empty_rows() {
        let dir = scratch_dir("spectra");
        let path = dir.join(SPECTRA_FILE);

        let mut columns = BTreeMap::new();
        columns.insert(speed(10), vec![Some(0.5), None, Some(1.5)]);
        columns.insert(speed(90), vec![Some(2.0), None, None]);
        let matrix = BinnedSpectrumMatrix::from_columns(columns);
        write_spectrum_matrix(&path, &matrix).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Frequency (Hz),10,90\n0,0.5,2\n2,1.5,\n");

        let restored = read_spectrum_matrix(&path).unwrap();
        assert_eq!(restored.get(0, speed(90)), Some(2.0));
        assert_eq!(restored.get(1, speed(10)), None);
        assert_eq!(restored.get(2, speed(10)), Some(1.5));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_spectrum_matrix_floors_fractional_labels() {
        let dir = scratch_dir("fractional");
        let path = dir.join(SPECTRA_FILE);
        fs::write(&path, "Frequency (Hz),10\n0.5,1.0\n0.75,9.0\n1.25,2.0\n").unwrap();

        let restored = read_spectrum_matrix(&path).unwrap();
        assert_eq!(restored.num_bins(), 2);
        assert_eq!(restored.get(0, speed(10)), Some(1.0));
        assert_eq!(restored.get(1, speed(10)), Some(2.0));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_spectrum_matrix_skips_out_of_range_labels() {
        let dir = scratch_dir("hugelabel");
        let path = dir.join(SPECTRA_FILE);
        fs::write(&path, "Frequency (Hz),10\n0,1.0\n1e15,5.0\n-3,4.0\n").unwrap();

        let restored = read_spectrum_matrix(&path).unwrap();
        assert_eq!(restored.num_bins(), 1);
        assert_eq!(restored.get(0, speed(10)), Some(1.0));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_spectrum_matrix_rejects_bad_speed_header() {
        let dir = scratch_dir("badheader");
        let path = dir.join(SPECTRA_FILE);
        fs::write(&path, "Frequency (Hz),10,fast\n0,1,2\n").unwrap();

        assert!(matches!(read_spectrum_matrix(&path), Err(AnalysisError::Schema { .. })));

        fs::remove_dir_all(&dir).ok();
    }
}
