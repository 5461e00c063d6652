use anyhow::{bail, Result};
use std::{env, path::Path};
use usage_service::{
    config::AppConfig,
    observability,
    replay::{replay_as_of, replay_usage_log},
};

/// Rebuild a session from a recorded usage log and print its summary.
///
/// Usage:
///   replay_usage_log <usage_log.csv>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: replay_usage_log <usage_log_csv_path>");
    }
    let file_path = Path::new(&args[1]);

    // USAGE_CONFIG selects the tariff to bill the log under.
    let cfg = AppConfig::load()?;

    let mut session = replay_usage_log(file_path, cfg.session_config()?).await?;
    let as_of = replay_as_of(&session);
    let summary = session.summary(as_of)?;
    let breakdown = session.bill_breakdown()?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    for tier in breakdown {
        println!(
            "tier {}: {:.3} kWh @ {} = {:.2}",
            tier.tier, tier.units, tier.rate, tier.charge
        );
    }

    Ok(())
}
