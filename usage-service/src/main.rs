use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;
use usage_core::{Session, UsageReading};
use usage_service::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    sinks::{self, SessionSink},
    sources::{HttpReadingSource, SimulatedSource},
    transform,
    usage_log::UsageLogWriter,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr).await?;
    }

    let session_cfg = cfg.session_config()?;
    tracing::info!(
        tariff = %session_cfg.slabs.fingerprint(),
        slabs = session_cfg.slabs.slabs().len(),
        min_samples = session_cfg.projector.min_samples(),
        "tariff loaded"
    );
    let session = sinks::shared(Session::new(session_cfg, OffsetDateTime::now_utc())?);

    let usage_log = || cfg.usage_log.as_ref().map(|l| UsageLogWriter::new(&l.path));

    // Simulated meter pipeline
    let simulated: Pipeline<_, UsageReading, _> = Pipeline {
        name: "simulated",
        source: SimulatedSource::from_config(&cfg.simulation),
        transforms: vec![Arc::new(transform::ReadingValidation)],
        sink: SessionSink::new(session.clone(), usage_log()),
    };

    // Manual readings pipeline, sharing the same session
    let manual = match &cfg.http {
        Some(http_cfg) => Some(Pipeline {
            name: "manual",
            source: HttpReadingSource::new(
                &http_cfg.http_bind_addr,
                http_cfg.channel_capacity,
                session.clone(),
            )
            .await?,
            transforms: vec![Arc::new(transform::ReadingValidation)],
            sink: SessionSink::new(session.clone(), usage_log()),
        }),
        None => None,
    };

    let run = async {
        match manual {
            Some(manual) => tokio::try_join!(simulated.run(), manual.run()).map(|_| ()),
            None => simulated.run().await,
        }
    };

    tokio::select! {
        res = run => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, stopping session"),
    }

    let summary = session.lock().await.summary(OffsetDateTime::now_utc())?;
    tracing::info!(
        readings = summary.readings,
        total_kwh = summary.total_kwh,
        bill = summary.bill,
        "session ended"
    );

    Ok(())
}
