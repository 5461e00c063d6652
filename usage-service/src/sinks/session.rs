use std::{sync::Arc, time::SystemTime};

use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use usage_core::{session::TickReport, Forecast, Session, UsageReading};

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    usage_log::UsageLogWriter,
};

/// One session shared by every tick source. Writers take the lock for one
/// append plus its recomputation, so readings stay strictly ordered.
pub type SharedSession = Arc<Mutex<Session>>;

pub fn shared(session: Session) -> SharedSession {
    Arc::new(Mutex::new(session))
}

/// Records readings into the shared session and, optionally, the usage log.
pub struct SessionSink {
    session: SharedSession,
    log: Option<UsageLogWriter>,
}

impl SessionSink {
    pub fn new(session: SharedSession, log: Option<UsageLogWriter>) -> Self {
        Self { session, log }
    }

    /// Returns `None` when the reading was rejected by the session.
    async fn apply(&self, env: Envelope<UsageReading>) -> Result<Option<TickReport>, PipelineError> {
        let now = OffsetDateTime::now_utc();
        let reading = UsageReading::at(env.payload.ts.unwrap_or(now), env.payload.kwh);

        if let Err(e) = reading.validate() {
            tracing::warn!(error = %e, origin = %env.origin, "reading rejected by session");
            metrics::counter!("usage_readings_rejected_total", "origin" => env.origin.to_string()).increment(1);
            return Ok(None);
        }

        let mut session = self.session.lock().await;

        // Log and session are updated under the same lock so both see one order.
        if let Some(log) = &self.log {
            log.append(&reading, now)?;
        }
        let report = session
            .record(reading, now)
            .map_err(|e| PipelineError::Sink(e.to_string()))?;

        let next = session.predict_next();
        let projection = session
            .project_period(now)
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
        drop(session);

        tracing::info!(
            origin = %env.origin,
            index = report.index,
            kwh = report.kwh,
            total_kwh = report.total_kwh,
            bill = report.bill,
            "reading recorded"
        );

        metrics::counter!("usage_readings_recorded_total", "origin" => env.origin.to_string()).increment(1);
        metrics::gauge!("usage_total_kwh").set(report.total_kwh);
        metrics::gauge!("usage_bill_amount").set(report.bill);
        metrics::gauge!("usage_daily_kwh").set(report.daily_kwh);

        match next {
            Forecast::Ready(kwh) => {
                tracing::debug!(predicted_next_kwh = kwh, "trend prediction updated");
                metrics::gauge!("usage_predicted_next_kwh").set(kwh);
            }
            Forecast::NotEnoughData(reason) => {
                tracing::debug!(%reason, "trend prediction not available");
            }
        }

        if let Forecast::Ready(p) = projection {
            tracing::debug!(projected_kwh = p.total_kwh, projected_bill = p.bill, "period projection updated");
            metrics::gauge!("usage_projected_period_kwh").set(p.total_kwh);
            metrics::gauge!("usage_projected_period_bill").set(p.bill);
        }

        if let Ok(dur) = SystemTime::now().duration_since(env.received_at) {
            metrics::histogram!("usage_tick_latency_seconds").record(dur.as_secs_f64());
        }

        Ok(Some(report))
    }
}

#[async_trait::async_trait]
impl Sink<UsageReading> for SessionSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<UsageReading>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for SessionSink");
                    continue;
                }
            };

            let Some(report) = self.apply(env).await? else {
                continue;
            };

            // Crossing state lives in the shared session.
            if report.daily_limit_crossed {
                tracing::warn!(daily_kwh = report.daily_kwh, "daily usage limit exceeded");
                metrics::counter!("usage_daily_limit_exceeded_total").increment(1);
            }
        }

        Ok(())
    }
}
