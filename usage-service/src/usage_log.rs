//! Append-only CSV usage log with columns `Timestamp,Usage_kWh`.
//!
//! Timestamps are written as `YYYY-MM-DD HH:MM:SS` in UTC.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};
use usage_core::UsageReading;

use crate::pipeline::PipelineError;

pub const TIMESTAMP_COLUMN: &str = "Timestamp";
pub const USAGE_COLUMN: &str = "Usage_kWh";

pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, PipelineError> {
    ts.to_offset(time::UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .map_err(|e| PipelineError::Sink(format!("failed to format timestamp: {e}")))
}

pub fn parse_timestamp(s: &str) -> Result<OffsetDateTime, PipelineError> {
    PrimitiveDateTime::parse(
        s.trim(),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|e| PipelineError::Source(format!("invalid {TIMESTAMP_COLUMN} '{s}': {e}")))
}

pub struct UsageLogWriter {
    path: PathBuf,
}

impl UsageLogWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub fn append(&self, reading: &UsageReading, fallback_ts: OffsetDateTime) -> Result<(), PipelineError> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PipelineError::Sink(format!("failed to open usage log: {e}")))?;

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            wtr.write_record([TIMESTAMP_COLUMN, USAGE_COLUMN])
                .map_err(|e| PipelineError::Sink(format!("failed to write usage log header: {e}")))?;
        }

        let ts = format_timestamp(reading.ts.unwrap_or(fallback_ts))?;
        wtr.write_record([ts, reading.kwh.to_string()])
            .map_err(|e| PipelineError::Sink(format!("failed to write usage log row: {e}")))?;
        wtr.flush()
            .map_err(|e| PipelineError::Sink(format!("failed to flush usage log: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamp_round_trips_at_second_precision() {
        let ts = datetime!(2024-06-30 23:59:58 UTC);
        let s = format_timestamp(ts).unwrap();
        assert_eq!(s, "2024-06-30 23:59:58");
        assert_eq!(parse_timestamp(&s).unwrap(), ts);
    }

    #[test]
    fn non_utc_timestamps_are_written_in_utc() {
        let ts = datetime!(2024-06-30 12:00:00 +05:30);
        assert_eq!(format_timestamp(ts).unwrap(), "2024-06-30 06:30:00");
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage_log.csv");
        let writer = UsageLogWriter::new(&path);
        let ts = datetime!(2024-01-01 00:00:00 UTC);

        writer.append(&UsageReading::at(ts, 0.125), ts).unwrap();
        writer.append(&UsageReading::new(0.5), ts).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Timestamp,Usage_kWh",
                "2024-01-01 00:00:00,0.125",
                "2024-01-01 00:00:00,0.5",
            ]
        );
    }
}
