//! CSV replay: logged samples in, trajectory rows out.
//!
//! The input layout is the sensor logger's:
//!
//! ```text
//! Timestamp,Raw_Accel_X,Raw_Accel_Y,Raw_Accel_Z[,Raw_Gyro_X,Raw_Gyro_Y,Raw_Gyro_Z[,...]]
//! ```
//!
//! Columns are found by header name, case-insensitively, so extra columns
//! (for example previously computed positions) are ignored. The short names
//! `x`, `y`, `z` and `gx`, `gy`, `gz` are accepted as well. A file without
//! gyro columns, or a row with empty gyro fields, yields samples without an
//! angular rate.
//!
//! The output is one `timestamp_ms,x,y,z,pen_down` row per position update.

use std::io;

use log::{debug, info};
use nalgebra::Vector3;
use serde::Serialize;
use thiserror::Error;

use crate::error::EstimatorError;
use crate::estimator::{EstimatorDiagnostics, MotionEstimator};
use crate::strokes::{Stroke, StrokeCollector};
use crate::types::{PositionUpdate, SensorSample};

const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "timestamp_ms", "t"];
const ACCEL_COLUMNS: [&[&str]; 3] = [
    &["raw_accel_x", "accel_x", "ax", "x"],
    &["raw_accel_y", "accel_y", "ay", "y"],
    &["raw_accel_z", "accel_z", "az", "z"],
];
const GYRO_COLUMNS: [&[&str]; 3] = [
    &["raw_gyro_x", "gyro_x", "gx"],
    &["raw_gyro_y", "gyro_y", "gy"],
    &["raw_gyro_z", "gyro_z", "gz"],
];

/// Errors from reading or writing replay files.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("missing required column {0:?}")]
    MissingColumn(&'static str),

    #[error("line {line}: invalid {column} value {value:?}")]
    InvalidValue {
        line: u64,
        column: &'static str,
        value: String,
    },
}

/// Options for parsing a sample log.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOptions {
    /// Drop rows whose acceleration equals `dropout_sentinel`.
    pub skip_dropouts: bool,
    /// Acceleration the sensor firmware logs for a failed read.
    pub dropout_sentinel: [f64; 3],
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            skip_dropouts: false,
            dropout_sentinel: [-1.0, -1.0, -1.0],
        }
    }
}

struct Columns {
    timestamp: usize,
    accel: [usize; 3],
    gyro: Option<[usize; 3]>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, ReplayError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };

        let timestamp = find(TIMESTAMP_COLUMNS).ok_or(ReplayError::MissingColumn("Timestamp"))?;
        let accel = [
            find(ACCEL_COLUMNS[0]).ok_or(ReplayError::MissingColumn("Raw_Accel_X"))?,
            find(ACCEL_COLUMNS[1]).ok_or(ReplayError::MissingColumn("Raw_Accel_Y"))?,
            find(ACCEL_COLUMNS[2]).ok_or(ReplayError::MissingColumn("Raw_Accel_Z"))?,
        ];
        let gyro = match (
            find(GYRO_COLUMNS[0]),
            find(GYRO_COLUMNS[1]),
            find(GYRO_COLUMNS[2]),
        ) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        };

        Ok(Self {
            timestamp,
            accel,
            gyro,
        })
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or("")
}

fn parse_f64(record: &csv::StringRecord, index: usize, column: &'static str) -> Result<f64, ReplayError> {
    let raw = field(record, index);
    raw.parse::<f64>().map_err(|_| ReplayError::InvalidValue {
        line: record.position().map_or(0, |p| p.line()),
        column,
        value: raw.to_string(),
    })
}

fn parse_timestamp(record: &csv::StringRecord, index: usize) -> Result<u64, ReplayError> {
    let raw = field(record, index);
    if let Ok(ms) = raw.parse::<u64>() {
        return Ok(ms);
    }
    // Fractional milliseconds are rounded.
    match raw.parse::<f64>() {
        Ok(ms) if ms.is_finite() && ms >= 0.0 && ms <= u64::MAX as f64 => Ok(ms.round() as u64),
        _ => Err(ReplayError::InvalidValue {
            line: record.position().map_or(0, |p| p.line()),
            column: "Timestamp",
            value: raw.to_string(),
        }),
    }
}

/// Parses a sample log.
pub fn read_samples<R: io::Read>(
    reader: R,
    options: &ReplayOptions,
) -> Result<Vec<SensorSample>, ReplayError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::locate(reader.headers()?)?;
    if columns.gyro.is_none() {
        debug!("no gyro columns, replaying accelerometer only");
    }

    let mut samples = Vec::new();
    let mut dropouts = 0usize;

    for record in reader.records() {
        let record = record?;
        let timestamp_ms = parse_timestamp(&record, columns.timestamp)?;
        let accel = [
            parse_f64(&record, columns.accel[0], "Raw_Accel_X")?,
            parse_f64(&record, columns.accel[1], "Raw_Accel_Y")?,
            parse_f64(&record, columns.accel[2], "Raw_Accel_Z")?,
        ];

        if options.skip_dropouts && accel == options.dropout_sentinel {
            dropouts += 1;
            continue;
        }

        let gyro = match columns.gyro {
            Some(idx) if idx.iter().all(|&i| !field(&record, i).is_empty()) => Some([
                parse_f64(&record, idx[0], "Raw_Gyro_X")?,
                parse_f64(&record, idx[1], "Raw_Gyro_Y")?,
                parse_f64(&record, idx[2], "Raw_Gyro_Z")?,
            ]),
            _ => None,
        };

        samples.push(SensorSample {
            timestamp_ms,
            accel,
            gyro,
        });
    }

    debug!(
        "read {} samples ({} dropouts skipped)",
        samples.len(),
        dropouts
    );
    Ok(samples)
}

#[derive(Serialize)]
struct TrajectoryRow {
    timestamp_ms: u64,
    x: f64,
    y: f64,
    z: f64,
    pen_down: bool,
}

/// CSV sink for position updates.
pub struct TrajectoryWriter<W: io::Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: io::Write> TrajectoryWriter<W> {
    /// Wraps `inner` and writes the header row.
    pub fn new(inner: W) -> Result<Self, ReplayError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(["timestamp_ms", "x", "y", "z", "pen_down"])?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, update: &PositionUpdate) -> Result<(), ReplayError> {
        self.writer.serialize(TrajectoryRow {
            timestamp_ms: update.timestamp_ms,
            x: update.position.x,
            y: update.position.y,
            z: update.position.z,
            pen_down: update.pen_state.is_down(),
        })?;
        self.rows += 1;
        Ok(())
    }

    /// Number of rows written, excluding the header.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), ReplayError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, ReplayError> {
        self.writer
            .into_inner()
            .map_err(|err| ReplayError::Io(err.into_error()))
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    /// Samples accepted by the estimator.
    pub samples_fed: u64,
    pub updates_emitted: u64,
    pub final_position: Vector3<f64>,
    /// Pen-down runs in the emitted trajectory.
    pub strokes: Vec<Stroke>,
    /// Ordering violation that ended the replay early, if any.
    pub stopped_by: Option<EstimatorError>,
    pub total_distance: f64,
    pub diagnostics: EstimatorDiagnostics,
}

/// Feeds `samples` through `estimator` in order, writing every update to
/// `sink`.
///
/// The replay stops at the first out-of-order sample; the violation is
/// reported in the summary. Only sink I/O failures are returned as errors.
pub fn run<I, W>(
    estimator: &mut MotionEstimator,
    samples: I,
    sink: &mut TrajectoryWriter<W>,
) -> Result<ReplaySummary, ReplayError>
where
    I: IntoIterator<Item = SensorSample>,
    W: io::Write,
{
    let mut strokes = StrokeCollector::new();
    let mut samples_fed = 0u64;
    let mut updates_emitted = 0u64;
    let mut stopped_by = None;

    for sample in samples {
        match estimator.add_sample(&sample) {
            Ok(update) => {
                samples_fed += 1;
                if let Some(update) = update {
                    sink.write(&update)?;
                    strokes.push(&update);
                    updates_emitted += 1;
                }
            }
            Err(err) => {
                info!("replay stopped after {samples_fed} samples: {err}");
                stopped_by = Some(err);
                break;
            }
        }
    }
    sink.flush()?;

    if strokes.has_open_stroke() {
        debug!(
            "closing stroke still open at end of replay ({} already complete)",
            strokes.completed().len()
        );
    }

    Ok(ReplaySummary {
        samples_fed,
        updates_emitted,
        final_position: estimator.position(),
        strokes: strokes.finish(),
        stopped_by,
        total_distance: estimator.total_distance(),
        diagnostics: estimator.diagnostics(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimatorConfig;

    const LOG_WITH_GYRO: &str = "\
Timestamp,Raw_Accel_X,Raw_Accel_Y,Raw_Accel_Z,Raw_Gyro_X,Raw_Gyro_Y,Raw_Gyro_Z,Calc_Pos_X,Calc_Pos_Y,Calc_Pos_Z
40692,276,-16152,2796,0.0,0.0,0.1,0,0,0
40796,952,-15996,2680,0.0,0.0,0.1,0,0,0
";

    #[test]
    fn test_reads_logger_layout() {
        let samples = read_samples(LOG_WITH_GYRO.as_bytes(), &ReplayOptions::default()).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp_ms, 40692);
        assert_eq!(samples[0].accel, [276.0, -16152.0, 2796.0]);
        assert_eq!(samples[1].gyro, Some([0.0, 0.0, 0.1]));
    }

    #[test]
    fn test_headers_are_case_insensitive_and_gyro_optional() {
        let csv = "timestamp, x, y, z\n100, 1, 2, 3\n";
        let samples = read_samples(csv.as_bytes(), &ReplayOptions::default()).unwrap();
        assert_eq!(samples, vec![SensorSample::new(100, [1.0, 2.0, 3.0])]);
    }

    #[test]
    fn test_empty_gyro_fields_mean_no_gyro() {
        let csv = "Timestamp,Raw_Accel_X,Raw_Accel_Y,Raw_Accel_Z,Raw_Gyro_X,Raw_Gyro_Y,Raw_Gyro_Z\n\
                   5,1,2,3,,,\n";
        let samples = read_samples(csv.as_bytes(), &ReplayOptions::default()).unwrap();
        assert_eq!(samples[0].gyro, None);
    }

    #[test]
    fn test_dropouts_kept_unless_skipped() {
        let csv = "Timestamp,Raw_Accel_X,Raw_Accel_Y,Raw_Accel_Z\n1,5,5,5\n2,-1,-1,-1\n3,6,6,6\n";

        let all = read_samples(csv.as_bytes(), &ReplayOptions::default()).unwrap();
        assert_eq!(all.len(), 3);

        let options = ReplayOptions {
            skip_dropouts: true,
            ..ReplayOptions::default()
        };
        let kept = read_samples(csv.as_bytes(), &options).unwrap();
        assert_eq!(
            kept.iter().map(|s| s.timestamp_ms).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_missing_column() {
        let csv = "Timestamp,Raw_Accel_X,Raw_Accel_Y\n1,2,3\n";
        let err = read_samples(csv.as_bytes(), &ReplayOptions::default()).unwrap_err();
        assert!(matches!(err, ReplayError::MissingColumn("Raw_Accel_Z")));
    }

    #[test]
    fn test_invalid_value_reports_line() {
        let csv = "Timestamp,Raw_Accel_X,Raw_Accel_Y,Raw_Accel_Z\n1,2,3,4\n2,oops,3,4\n";
        let err = read_samples(csv.as_bytes(), &ReplayOptions::default()).unwrap_err();
        match err {
            ReplayError::InvalidValue {
                line,
                column,
                value,
            } => {
                assert_eq!(line, 3);
                assert_eq!(column, "Raw_Accel_X");
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fractional_and_negative_timestamps() {
        let csv = "Timestamp,x,y,z\n100.6,0,0,0\n";
        let samples = read_samples(csv.as_bytes(), &ReplayOptions::default()).unwrap();
        assert_eq!(samples[0].timestamp_ms, 101);

        let csv = "Timestamp,x,y,z\n-5,0,0,0\n";
        assert!(read_samples(csv.as_bytes(), &ReplayOptions::default()).is_err());
    }

    #[test]
    fn test_run_writes_rows_and_collects_strokes() {
        let bias = EstimatorConfig::default().calibration.accel_bias;
        let rest = [bias[0], bias[1], bias[2]];
        let push_y = [bias[0], bias[1] + 1000.0, bias[2]];

        let mut samples: Vec<_> = (0..4).map(|i| SensorSample::new(i * 100, rest)).collect();
        samples.push(SensorSample::new(400, push_y));
        samples.push(SensorSample::new(500, push_y));
        samples.extend((6..9).map(|i| SensorSample::new(i * 100, rest)));

        let mut estimator = MotionEstimator::default();
        let mut sink = TrajectoryWriter::new(Vec::new()).unwrap();
        let summary = run(&mut estimator, samples, &mut sink).unwrap();

        assert_eq!(summary.samples_fed, 9);
        assert_eq!(summary.updates_emitted, 8);
        assert_eq!(sink.rows(), 8);
        assert!(summary.stopped_by.is_none());
        assert_eq!(summary.strokes.len(), 1);
        // Burst at 400 and 500, then two more moving samples before rest.
        assert_eq!(summary.strokes[0].start_ms, 400);
        assert_eq!(summary.strokes[0].end_ms, 700);

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp_ms,x,y,z,pen_down"));
        assert_eq!(lines.next(), Some("100,0.0,0.0,0.0,false"));
    }

    #[test]
    fn test_run_stops_at_ordering_violation() {
        let samples = vec![
            SensorSample::new(100, [0.0; 3]),
            SensorSample::new(200, [0.0; 3]),
            SensorSample::new(150, [0.0; 3]),
            SensorSample::new(300, [0.0; 3]),
        ];
        let mut estimator = MotionEstimator::default();
        let mut sink = TrajectoryWriter::new(io::sink()).unwrap();
        let summary = run(&mut estimator, samples, &mut sink).unwrap();

        assert_eq!(summary.samples_fed, 2);
        assert_eq!(
            summary.stopped_by,
            Some(EstimatorError::InvalidSampleOrder {
                previous_ms: 200,
                timestamp_ms: 150
            })
        );
    }
}
