use anyhow::{bail, Result};
use std::{env, path::Path};
use usage_core::Forecast;
use usage_service::{config::AppConfig, observability, replay::replay_usage_log};

/// Report readings far above the log's mean.
///
/// Usage:
///   detect_anomalies <usage_log.csv>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: detect_anomalies <usage_log_csv_path>");
    }

    let cfg = AppConfig::load()?;
    let session = replay_usage_log(Path::new(&args[1]), cfg.session_config()?).await?;

    match session.anomalies() {
        Forecast::Ready(found) if found.is_empty() => println!("No abnormal readings."),
        Forecast::Ready(found) => {
            for a in found {
                println!(
                    "Abnormal usage at reading {}: {} kWh (threshold {:.3} kWh)",
                    a.index, a.kwh, a.threshold
                );
            }
        }
        Forecast::NotEnoughData(reason) => println!("Not enough data for anomaly detection: {reason}"),
    }

    Ok(())
}
