use anyhow::{bail, Result};
use std::{env, path::Path};
use usage_core::Forecast;
use usage_service::{config::AppConfig, observability, replay::replay_usage_log};

/// Predict tomorrow's total from the daily totals in a usage log.
///
/// Usage:
///   predict_next_day <usage_log.csv>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: predict_next_day <usage_log_csv_path>");
    }

    let cfg = AppConfig::load()?;
    let session = replay_usage_log(Path::new(&args[1]), cfg.session_config()?).await?;

    match session.predict_next_day() {
        Forecast::Ready(kwh) => println!("Predicted next-day usage: {kwh} kWh"),
        Forecast::NotEnoughData(reason) => println!("No prediction yet: {reason}"),
    }

    Ok(())
}
