use std::{path::Path, sync::Arc};

use time::OffsetDateTime;
use usage_core::{Session, SessionConfig, UsageReading};

use crate::{
    pipeline::{Pipeline, PipelineError},
    sinks::{self, SessionSink},
    sources::UsageLogCsvSource,
    transform,
};

/// Run a recorded usage log through validation into a fresh session.
///
/// The returned session is anchored at the log's first reading, so a
/// wall-clock projection should be taken as of [`replay_as_of`].
pub async fn replay_usage_log(path: &Path, config: SessionConfig) -> Result<Session, PipelineError> {
    let session = Session::new(config, OffsetDateTime::now_utc())
        .map_err(|e| PipelineError::Sink(e.to_string()))?;
    let shared = sinks::shared(session);

    let pipeline: Pipeline<_, UsageReading, _> = Pipeline {
        name: "replay",
        source: UsageLogCsvSource::new(path),
        transforms: vec![Arc::new(transform::ReadingValidation)],
        sink: SessionSink::new(shared.clone(), None),
    };
    pipeline.run().await?;

    let mut session = Arc::try_unwrap(shared)
        .map(tokio::sync::Mutex::into_inner)
        .map_err(|_| PipelineError::Sink("replay session still shared after pipeline finished".to_string()))?;
    session.anchor_to_first_reading();
    Ok(session)
}

/// Log time of the last replayed reading; falls back to now for an empty log.
pub fn replay_as_of(session: &Session) -> OffsetDateTime {
    session.last_tick_time().unwrap_or_else(OffsetDateTime::now_utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage_log::UsageLogWriter;
    use time::macros::datetime;
    use usage_core::{session::ElapsedBasis, Forecast, RateSlab, SlabTable};

    #[tokio::test]
    async fn replay_rebuilds_session_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage_log.csv");
        let writer = UsageLogWriter::new(&path);

        let start = datetime!(2024-04-01 00:00:00 UTC);
        for day in 0..3i64 {
            for hour in 0..4i64 {
                let ts = start + time::Duration::days(day) + time::Duration::hours(hour);
                writer.append(&UsageReading::at(ts, 0.5 + day as f64 * 0.25), ts).unwrap();
            }
        }

        let slabs = SlabTable::new(vec![RateSlab::new(f64::INFINITY, 2.0)]).unwrap();
        let mut session = replay_usage_log(&path, SessionConfig::new(slabs)).await.unwrap();

        assert_eq!(session.readings().len(), 12);
        // Day totals 2.0, 3.0, 4.0.
        assert_eq!(session.predict_next_day(), Forecast::Ready(5.0));
        assert_eq!(session.bill().unwrap(), 18.0);
        assert!(session.predict_next().is_ready());
    }

    #[tokio::test]
    async fn wall_clock_replay_measures_log_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage_log.csv");
        let writer = UsageLogWriter::new(&path);

        let start = datetime!(2024-04-01 00:00:00 UTC);
        for hour in 0..=10i64 {
            let ts = start + time::Duration::hours(hour);
            writer.append(&UsageReading::at(ts, 0.5), ts).unwrap();
        }

        let slabs = SlabTable::new(vec![RateSlab::new(f64::INFINITY, 2.0)]).unwrap();
        let mut config = SessionConfig::new(slabs);
        config.elapsed_basis = ElapsedBasis::WallClock;
        let session = replay_usage_log(&path, config).await.unwrap();

        assert_eq!(session.started_at(), start);
        let as_of = replay_as_of(&session);
        assert_eq!(as_of, start + time::Duration::hours(10));

        // 5.5 kWh over 10 hourly ticks, scaled to 720.
        let projection = session.project_period(as_of).unwrap().ready().unwrap();
        assert!((projection.rate_per_tick - 0.55).abs() < 1e-12);
        assert_eq!(projection.total_kwh, 396.0);
    }
}
