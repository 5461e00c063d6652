//! Spike detection over a session's readings.

use crate::{
    domain::UsageSequence,
    error::CoreError,
    projector::{Forecast, Shortfall},
};

pub const DEFAULT_MIN_SAMPLES: usize = 5;
pub const DEFAULT_SIGMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyConfig {
    min_samples: usize,
    sigma: f64,
}

impl AnomalyConfig {
    pub fn new(min_samples: usize, sigma: f64) -> Result<Self, CoreError> {
        if min_samples < 2 {
            return Err(CoreError::InvalidConfiguration(format!(
                "anomaly min_samples must be at least 2, got {min_samples}"
            )));
        }
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(CoreError::InvalidConfiguration(format!(
                "anomaly sigma must be a non-negative number, got {sigma}"
            )));
        }
        Ok(Self { min_samples, sigma })
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            sigma: DEFAULT_SIGMA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Anomaly {
    pub index: usize,
    pub kwh: f64,
    pub threshold: f64,
}

/// Readings strictly above `mean + sigma * stddev` (sample standard deviation).
pub fn detect_anomalies(sequence: &UsageSequence, config: &AnomalyConfig) -> Forecast<Vec<Anomaly>> {
    let have = sequence.len();
    if have < config.min_samples {
        return Forecast::NotEnoughData(Shortfall::Samples {
            have,
            need: config.min_samples,
        });
    }

    let n = have as f64;
    let mean = sequence.total_kwh() / n;
    let variance = sequence.values().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let threshold = mean + config.sigma * variance.sqrt();

    Forecast::Ready(
        sequence
            .values()
            .enumerate()
            .filter(|(_, kwh)| *kwh > threshold)
            .map(|(index, kwh)| Anomaly { index, kwh, threshold })
            .collect(),
    )
}
