use crate::pipeline::{Envelope, PipelineError, Transform};
use time::macros::datetime;
use usage_core::UsageReading;

/// Pure validation of a `UsageReading`.
///
/// Rules:
/// - kWh must be finite and non-negative.
/// - ts, when present, must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_reading(env: Envelope<UsageReading>) -> Result<Envelope<UsageReading>, PipelineError> {
    env.payload
        .validate()
        .map_err(|e| PipelineError::Transform(e.to_string()))?;

    if let Some(ts) = env.payload.ts {
        let min_ts = datetime!(2000-01-01 00:00:00 UTC);
        let max_ts = datetime!(2100-01-01 00:00:00 UTC);

        if ts < min_ts || ts > max_ts {
            return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
        }
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<UsageReading, UsageReading> for ReadingValidation {
    async fn apply(
        &self,
        input: Envelope<UsageReading>,
    ) -> Result<Envelope<UsageReading>, PipelineError> {
        let origin = input.origin;
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("usage_readings_rejected_total", "origin" => origin.to_string())
                    .increment(1);
                Err(e)
            }
        }
    }
}
