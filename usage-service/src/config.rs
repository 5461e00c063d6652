use std::{fs, time::Duration};

use serde::Deserialize;
use usage_core::{
    anomaly::{self, AnomalyConfig},
    projector::{self, ProjectionPeriod, ProjectorConfig},
    session::{ElapsedBasis, DEFAULT_DAILY_LIMIT_KWH},
    CoreError, RateSlab, SessionConfig, SlabTable,
};

pub const CONFIG_ENV: &str = "USAGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "usage-config.toml";

/// Slab table as written in TOML. The last slab uses `up_to = inf`.
#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    pub slabs: Vec<RateSlab>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectorSection {
    pub min_samples: usize,
    pub min_days: usize,
    pub period_secs: u64,
    pub tick_secs: u64,
    pub elapsed_basis: ElapsedBasis,
}

impl Default for ProjectorSection {
    fn default() -> Self {
        Self {
            min_samples: projector::DEFAULT_MIN_SAMPLES,
            min_days: projector::DEFAULT_MIN_DAYS,
            period_secs: 30 * 24 * 3600,
            tick_secs: 3600,
            elapsed_basis: ElapsedBasis::Ticks,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub daily_limit_kwh: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            daily_limit_kwh: DEFAULT_DAILY_LIMIT_KWH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalySection {
    pub min_samples: usize,
    pub sigma: f64,
}

impl Default for AnomalySection {
    fn default() -> Self {
        Self {
            min_samples: anomaly::DEFAULT_MIN_SAMPLES,
            sigma: anomaly::DEFAULT_SIGMA,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub interval_ms: u64,
    pub min_kwh: f64,
    pub max_kwh: f64,
    pub diurnal_amplitude: f64,
    pub max_ticks: Option<u64>,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            min_kwh: 0.05,
            max_kwh: 0.60,
            diurnal_amplitude: 0.0,
            max_ticks: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSourceConfig {
    pub http_bind_addr: String,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageLogConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tariff: TariffConfig,
    #[serde(default)]
    pub projector: ProjectorSection,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub anomaly: AnomalySection,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub http: Option<HttpSourceConfig>,
    pub usage_log: Option<UsageLogConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate_simulation()?;
        Ok(cfg)
    }

    fn validate_simulation(&self) -> anyhow::Result<()> {
        let sim = &self.simulation;
        if !(sim.min_kwh >= 0.0 && sim.min_kwh <= sim.max_kwh && sim.max_kwh.is_finite()) {
            anyhow::bail!(
                "simulation range must satisfy 0 <= min_kwh <= max_kwh, got [{}, {}]",
                sim.min_kwh,
                sim.max_kwh
            );
        }
        if sim.interval_ms == 0 {
            anyhow::bail!("simulation.interval_ms must be positive");
        }
        Ok(())
    }

    /// Validate the tariff and thresholds into core types. A malformed table
    /// rejects the whole configuration.
    pub fn session_config(&self) -> Result<SessionConfig, CoreError> {
        let slabs = SlabTable::new(self.tariff.slabs.clone())?;
        let config = SessionConfig {
            slabs,
            projector: ProjectorConfig::new(self.projector.min_samples, self.projector.min_days)?,
            anomaly: AnomalyConfig::new(self.anomaly.min_samples, self.anomaly.sigma)?,
            period: ProjectionPeriod::new(
                Duration::from_secs(self.projector.period_secs),
                Duration::from_secs(self.projector.tick_secs),
            )?,
            elapsed_basis: self.projector.elapsed_basis,
            daily_limit_kwh: self.alerts.daily_limit_kwh,
        };
        config.validate()?;
        Ok(config)
    }
}
