//! CSV data recording.
//!
//! [`CsvRecorder`] is an [`EventSink`] that appends one row per telemetry
//! sample.  The file is opened in append mode so an interrupted run can
//! be resumed into the same recording; the header is written only when
//! the file is created.
//!
//! [`load_step_response`] reads a recording back for plant identification.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{info, warn};

use crate::app::events::{AppEvent, TelemetryData};
use crate::app::ports::EventSink;
use crate::error::Error;
use crate::plant::identify::StepSample;

pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_ELAPSED: &str = "Elapsed Time (s)";
pub const COL_TARGET_OUTPUT: &str = "Target Output (%)";
pub const COL_ACTUAL_TEMP: &str = "Actual Temp (C)";
pub const COL_SETPOINT: &str = "Setpoint (C)";
pub const COL_STATE: &str = "State";
/// Optional input column carrying the output the controller reported back.
/// Recordings made by [`CsvRecorder`] do not have it; [`load_step_response`]
/// falls back to the target output when it is absent.
pub const COL_ACTUAL_OUTPUT: &str = "Actual Output (%)";

const HEADER: [&str; 6] = [
    COL_TIMESTAMP,
    COL_ELAPSED,
    COL_TARGET_OUTPUT,
    COL_ACTUAL_TEMP,
    COL_SETPOINT,
    COL_STATE,
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn data_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Data(format!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

pub struct CsvRecorder {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
    /// Set after the first write failure so the log is not flooded.
    failed: bool,
}

impl CsvRecorder {
    /// Open `path` for appending, writing the header if the file is new
    /// or empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let is_new = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| data_err(&path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(|e| data_err(&path, e))?;
            writer.flush().map_err(|e| data_err(&path, e))?;
            info!("Recording to new file {}", path.display());
        } else {
            info!("Appending to {}", path.display());
        }
        Ok(Self {
            writer,
            path,
            rows: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written by this recorder (excluding the header).
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append one telemetry row and flush it to disk.
    pub fn record(&mut self, t: &TelemetryData) -> Result<(), Error> {
        let setpoint = t.setpoint_c.map(|sp| format!("{sp:.2}")).unwrap_or_default();
        let row = [
            Local::now().format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.2}", t.elapsed_s),
            format!("{:.1}", t.output_percent),
            format!("{:.2}", t.temperature_c),
            setpoint,
            format!("{:?}", t.state),
        ];
        self.writer
            .write_record(&row)
            .map_err(|e| data_err(&self.path, e))?;
        self.writer.flush().map_err(|e| data_err(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }
}

impl EventSink for CsvRecorder {
    fn emit(&mut self, event: &AppEvent) {
        let AppEvent::Telemetry(t) = event else {
            return;
        };
        if let Err(e) = self.record(t) {
            if !self.failed {
                warn!("Recording stopped: {e}");
                self.failed = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read a step-response recording.
///
/// Requires the elapsed-time, target-output and temperature columns;
/// the actual-output column is used when present.  Rows whose required
/// fields do not parse are skipped.
pub fn load_step_response(path: &Path) -> Result<Vec<StepSample>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| data_err(path, e))?;
    let headers = reader.headers().map_err(|e| data_err(path, e))?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let require = |name: &str| {
        column(name).ok_or_else(|| data_err(path, format!("missing column '{name}'")))
    };

    let elapsed = require(COL_ELAPSED)?;
    let target = require(COL_TARGET_OUTPUT)?;
    let temp = require(COL_ACTUAL_TEMP)?;
    let actual = column(COL_ACTUAL_OUTPUT);

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| data_err(path, e))?;
        let field = |i: usize| record.get(i).and_then(|s| s.parse::<f64>().ok());
        match (field(elapsed), field(target), field(temp)) {
            (Some(elapsed_s), Some(commanded_percent), Some(temp_c)) => {
                samples.push(StepSample {
                    elapsed_s,
                    commanded_percent,
                    actual_percent: actual.and_then(field),
                    temp_c,
                });
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("{}: skipped {skipped} unparsable rows", path.display());
    }
    info!("Loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::StateId;
    use std::io::Write;

    fn telemetry(elapsed_s: f64, temp: f64) -> TelemetryData {
        TelemetryData {
            elapsed_s,
            state: StateId::OpenLoop,
            temperature_c: temp,
            setpoint_c: None,
            output_percent: 40.0,
            segment_index: 0,
            fault_flags: 0,
        }
    }

    #[test]
    fn header_written_once_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");

        let mut rec = CsvRecorder::open(&path).unwrap();
        rec.emit(&AppEvent::Telemetry(telemetry(1.0, 25.0)));
        rec.emit(&AppEvent::FaultCleared);
        assert_eq!(rec.rows(), 1);
        drop(rec);

        let mut rec = CsvRecorder::open(&path).unwrap();
        rec.emit(&AppEvent::Telemetry(telemetry(2.0, 25.5)));
        drop(rec);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Timestamp,Elapsed Time (s),Target Output (%),Actual Temp (C),Setpoint (C),State"
        );
        assert!(lines[2].ends_with(",2.00,40.0,25.50,,OpenLoop"));
        assert!(!lines[0].contains(COL_ACTUAL_OUTPUT));
    }

    #[test]
    fn recording_loads_back_as_step_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut rec = CsvRecorder::open(&path).unwrap();
        for i in 0..5 {
            rec.record(&telemetry(f64::from(i), 25.0 + f64::from(i))).unwrap();
        }
        drop(rec);

        let samples = load_step_response(&path).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[3].elapsed_s, 3.0);
        assert_eq!(samples[3].commanded_percent, 40.0);
        assert_eq!(samples[3].temp_c, 28.0);
        assert_eq!(samples[3].actual_percent, None);
    }

    #[test]
    fn actual_output_column_is_optional_and_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("step.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            "Timestamp, Elapsed Time (s), Target Output (%), Actual Output (%), Actual Temp (C)"
        )
        .unwrap();
        writeln!(f, "2024-01-01 00:00:00, 0, 40, 39.8, 25.0").unwrap();
        writeln!(f, "2024-01-01 00:00:01, 1, 40, , 25.1").unwrap();
        writeln!(f, "2024-01-01 00:00:02, x, 40, 40.0, 25.2").unwrap();
        drop(f);

        let samples = load_step_response(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].actual_percent, Some(39.8));
        assert_eq!(samples[1].actual_percent, None);
        assert_eq!(samples[1].temp_c, 25.1);
    }

    #[test]
    fn missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Elapsed Time (s),Actual Temp (C)\n0,25\n").unwrap();
        let err = load_step_response(&path).unwrap_err();
        assert!(matches!(err, Error::Data(ref m) if m.contains("Target Output (%)")));
    }
}
