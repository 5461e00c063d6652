use std::{f64::consts::PI, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use time::OffsetDateTime;
use usage_core::UsageReading;

use crate::{
    config::SimulationConfig,
    pipeline::{Envelope, EnvelopeStream, Origin, PipelineError, Source},
};

/// Timer-driven random meter: one reading per tick.
///
/// Values are uniform in `[min_kwh, max_kwh]`, optionally shaped by a daily
/// sine wave, and rounded to 3 decimals like a real register would report.
pub struct SimulatedSource {
    min_kwh: f64,
    max_kwh: f64,
    diurnal_amplitude: f64,
    interval: Duration,
    max_ticks: Option<u64>,
    seed: Option<u64>,
}

impl SimulatedSource {
    pub fn new(min_kwh: f64, max_kwh: f64, interval: Duration) -> Self {
        Self {
            min_kwh,
            max_kwh,
            diurnal_amplitude: 0.0,
            interval,
            max_ticks: None,
            seed: None,
        }
    }

    pub fn from_config(cfg: &SimulationConfig) -> Self {
        Self {
            min_kwh: cfg.min_kwh,
            max_kwh: cfg.max_kwh,
            diurnal_amplitude: cfg.diurnal_amplitude,
            interval: Duration::from_millis(cfg.interval_ms),
            max_ticks: cfg.max_ticks,
            seed: cfg.seed,
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

pub fn generate_reading<R: Rng>(rng: &mut R, min_kwh: f64, max_kwh: f64, diurnal_amplitude: f64, hour: u8) -> f64 {
    let base = if max_kwh > min_kwh {
        rng.gen_range(min_kwh..=max_kwh)
    } else {
        min_kwh
    };
    let shape = 1.0 + diurnal_amplitude * (2.0 * PI * f64::from(hour) / 24.0).sin();
    ((base * shape).max(0.0) * 1000.0).round() / 1000.0
}

#[async_trait::async_trait]
impl Source<UsageReading> for SimulatedSource {
    async fn stream(&self) -> EnvelopeStream<UsageReading> {
        let (min_kwh, max_kwh, amplitude) = (self.min_kwh, self.max_kwh, self.diurnal_amplitude);
        let (interval, max_ticks, seed) = (self.interval, self.max_ticks, self.seed);

        let s = async_stream::stream! {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut ticker = tokio::time::interval(interval);
            let mut ticks: u64 = 0;

            while max_ticks.map_or(true, |max| ticks < max) {
                ticker.tick().await;
                let now = OffsetDateTime::now_utc();
                let kwh = generate_reading(&mut rng, min_kwh, max_kwh, amplitude, now.hour());
                ticks += 1;

                yield Ok::<_, PipelineError>(Envelope::new(UsageReading::at(now, kwh), Origin::Simulated));
            }

            tracing::info!(ticks, "simulated meter stopped");
        };

        Box::pin(s)
    }
}
