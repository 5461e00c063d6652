use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use usage_core::UsageReading;

use crate::{
    pipeline::{Envelope, EnvelopeStream, Origin, PipelineError, Source},
    usage_log::{parse_timestamp, TIMESTAMP_COLUMN, USAGE_COLUMN},
};

/// Replays a recorded usage log.
///
/// Expected header columns (by name):
/// - Timestamp (`YYYY-MM-DD HH:MM:SS`, UTC)
/// - Usage_kWh
pub struct UsageLogCsvSource {
    path: PathBuf,
}

impl UsageLogCsvSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn record_to_reading(record: &StringRecord, headers: &StringRecord) -> Result<UsageReading, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in usage log record")))
    };

    let ts = parse_timestamp(get(TIMESTAMP_COLUMN)?)?;

    let kwh_str = get(USAGE_COLUMN)?;
    let kwh: f64 = kwh_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid {USAGE_COLUMN} '{kwh_str}': {e}")))?;

    Ok(UsageReading::at(ts, kwh))
}

#[async_trait::async_trait]
impl Source<UsageReading> for UsageLogCsvSource {
    async fn stream(&self) -> EnvelopeStream<UsageReading> {
        // Blocking reader inside one task; logs are small.
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open usage log {}: {e}", path.display())))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read usage log headers: {e}")))?
                .clone();

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read usage log record: {e}"
                )))?;

                let reading = match record_to_reading(&record, &headers) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("usage_log_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope::new(reading, Origin::Replay);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage_log::UsageLogWriter;
    use futures::StreamExt;
    use time::macros::datetime;

    #[tokio::test]
    async fn replays_rows_written_by_the_log_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage_log.csv");
        let writer = UsageLogWriter::new(&path);
        let ts = datetime!(2024-02-01 10:00:00 UTC);
        writer.append(&UsageReading::at(ts, 0.2), ts).unwrap();
        writer.append(&UsageReading::at(ts + time::Duration::hours(1), 0.35), ts).unwrap();

        let readings: Vec<UsageReading> = UsageLogCsvSource::new(&path)
            .stream()
            .await
            .map(|r| r.unwrap().payload)
            .collect()
            .await;

        assert_eq!(
            readings,
            vec![
                UsageReading::at(ts, 0.2),
                UsageReading::at(datetime!(2024-02-01 11:00:00 UTC), 0.35),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_usage_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Timestamp,Usage_kWh\n2024-02-01 10:00:00,lots\n").unwrap();

        let items: Vec<_> = UsageLogCsvSource::new(&path).stream().await.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let items: Vec<_> = UsageLogCsvSource::new("/nonexistent/usage_log.csv")
            .stream()
            .await
            .collect()
            .await;
        assert!(matches!(items.as_slice(), [Err(PipelineError::Source(_))]));
    }
}
