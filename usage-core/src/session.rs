//! Explicit per-session context: the readings plus everything needed to bill
//! and forecast them.

use std::time::Duration;

use time::{Date, OffsetDateTime};

use crate::{
    anomaly::{detect_anomalies, Anomaly, AnomalyConfig},
    billing::{bill_breakdown, compute_bill, TierCharge},
    domain::{SlabTable, UsageReading, UsageSequence},
    error::CoreError,
    projector::{self, Elapsed, Forecast, PeriodProjection, ProjectionPeriod, ProjectorConfig, TrendModel},
    round_to,
};

pub const DEFAULT_DAILY_LIMIT_KWH: f64 = 5.0;

/// What the period projection divides the session total by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum ElapsedBasis {
    /// One reading per tick.
    #[default]
    Ticks,
    /// Wall-clock time since the session started, measured in ticks.
    WallClock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub slabs: SlabTable,
    pub projector: ProjectorConfig,
    pub anomaly: AnomalyConfig,
    pub period: ProjectionPeriod,
    pub elapsed_basis: ElapsedBasis,
    pub daily_limit_kwh: f64,
}

impl SessionConfig {
    pub fn new(slabs: SlabTable) -> Self {
        Self {
            slabs,
            projector: ProjectorConfig::default(),
            anomaly: AnomalyConfig::default(),
            period: ProjectionPeriod::monthly_hourly(),
            elapsed_basis: ElapsedBasis::default(),
            daily_limit_kwh: DEFAULT_DAILY_LIMIT_KWH,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.daily_limit_kwh.is_finite() || self.daily_limit_kwh < 0.0 {
            return Err(CoreError::InvalidConfiguration(format!(
                "daily limit must be a non-negative kWh value, got {}",
                self.daily_limit_kwh
            )));
        }
        Ok(())
    }
}

/// Outcome of recording one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TickReport {
    pub index: usize,
    pub kwh: f64,
    pub total_kwh: f64,
    pub bill: f64,
    pub daily_kwh: f64,
    pub daily_limit_exceeded: bool,
    /// True only for the reading that took the day over its limit.
    pub daily_limit_crossed: bool,
}

/// Display snapshot of a session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SessionSummary {
    pub readings: usize,
    pub latest_kwh: Option<f64>,
    pub total_kwh: f64,
    pub bill: f64,
    pub daily_kwh: f64,
    pub daily_limit_kwh: f64,
    pub daily_limit_exceeded: bool,
    pub tariff_fingerprint: String,
    pub next_reading: Forecast<f64>,
    pub period_projection: Forecast<PeriodProjection>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub started_at: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_tick_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DailyTally {
    day: Option<Date>,
    kwh: f64,
}

impl DailyTally {
    fn add(&mut self, day: Date, kwh: f64) {
        if self.day != Some(day) {
            self.day = Some(day);
            self.kwh = 0.0;
        }
        self.kwh += kwh;
    }
}

pub struct Session {
    config: SessionConfig,
    readings: UsageSequence,
    started_at: OffsetDateTime,
    last_tick_time: Option<OffsetDateTime>,
    daily: DailyTally,
    // Refit only when the sequence has grown since the last fit.
    fit_cache: Option<(usize, Forecast<TrendModel>)>,
}

impl Session {
    pub fn new(config: SessionConfig, now: OffsetDateTime) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            config,
            readings: UsageSequence::new(),
            started_at: now,
            last_tick_time: None,
            daily: DailyTally::default(),
            fit_cache: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn readings(&self) -> &UsageSequence {
        &self.readings
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Measure wall-clock elapsed time from the first recorded reading rather
    /// than from construction. Used when rebuilding a session from a log.
    pub fn anchor_to_first_reading(&mut self) {
        if let Some(ts) = self.readings.readings().first().and_then(|r| r.ts) {
            self.started_at = ts;
        }
    }

    pub fn last_tick_time(&self) -> Option<OffsetDateTime> {
        self.last_tick_time
    }

    /// Append one reading. Untimestamped readings are stamped with `now`.
    pub fn record(&mut self, reading: UsageReading, now: OffsetDateTime) -> Result<TickReport, CoreError> {
        let ts = reading.ts.unwrap_or(now);
        let index = self.readings.push(UsageReading::at(ts, reading.kwh))?;

        let was_exceeded = self.daily.day == Some(ts.date()) && self.daily_limit_exceeded();
        self.last_tick_time = Some(ts);
        self.daily.add(ts.date(), reading.kwh);
        let exceeded = self.daily_limit_exceeded();

        Ok(TickReport {
            index,
            kwh: reading.kwh,
            total_kwh: round_to(self.readings.total_kwh(), 3),
            bill: self.bill()?,
            daily_kwh: round_to(self.daily.kwh, 3),
            daily_limit_exceeded: exceeded,
            daily_limit_crossed: exceeded && !was_exceeded,
        })
    }

    pub fn bill(&self) -> Result<f64, CoreError> {
        Ok(compute_bill(self.readings.total_kwh(), &self.config.slabs)?)
    }

    pub fn bill_breakdown(&self) -> Result<Vec<TierCharge>, CoreError> {
        Ok(bill_breakdown(self.readings.total_kwh(), &self.config.slabs)?)
    }

    pub fn daily_limit_exceeded(&self) -> bool {
        self.daily.kwh > self.config.daily_limit_kwh
    }

    pub fn trend(&mut self) -> Forecast<TrendModel> {
        let len = self.readings.len();
        if let Some((cached_len, fit)) = self.fit_cache {
            if cached_len == len {
                return fit;
            }
        }

        let fit = projector::trend(&self.readings, &self.config.projector);
        self.fit_cache = Some((len, fit));
        fit
    }

    pub fn predict_next(&mut self) -> Forecast<f64> {
        let n = self.readings.len() as f64;
        self.trend().map(|model| round_to(model.at(n), 3))
    }

    pub fn elapsed(&self, now: OffsetDateTime) -> Elapsed {
        match self.config.elapsed_basis {
            ElapsedBasis::Ticks => Elapsed::Ticks(self.readings.len() as u64),
            ElapsedBasis::WallClock => {
                Elapsed::Time(Duration::try_from(now - self.started_at).unwrap_or(Duration::ZERO))
            }
        }
    }

    pub fn project_period(&self, now: OffsetDateTime) -> Result<Forecast<PeriodProjection>, CoreError> {
        Ok(projector::project_period(
            &self.readings,
            self.elapsed(now),
            &self.config.period,
            &self.config.slabs,
            &self.config.projector,
        )?)
    }

    pub fn predict_next_day(&self) -> Forecast<f64> {
        projector::predict_next_day(self.readings.readings(), &self.config.projector)
    }

    pub fn anomalies(&self) -> Forecast<Vec<Anomaly>> {
        detect_anomalies(&self.readings, &self.config.anomaly)
    }

    pub fn summary(&mut self, now: OffsetDateTime) -> Result<SessionSummary, CoreError> {
        Ok(SessionSummary {
            readings: self.readings.len(),
            latest_kwh: self.readings.last().map(|r| r.kwh),
            total_kwh: round_to(self.readings.total_kwh(), 3),
            bill: self.bill()?,
            daily_kwh: round_to(self.daily.kwh, 3),
            daily_limit_kwh: self.config.daily_limit_kwh,
            daily_limit_exceeded: self.daily_limit_exceeded(),
            tariff_fingerprint: self.config.slabs.fingerprint(),
            next_reading: self.predict_next(),
            period_projection: self.project_period(now)?,
            started_at: self.started_at,
            last_tick_time: self.last_tick_time,
        })
    }

    /// Drop every reading and start a new session at `now`.
    pub fn reset(&mut self, now: OffsetDateTime) {
        self.readings.reset();
        self.started_at = now;
        self.last_tick_time = None;
        self.daily = DailyTally::default();
        self.fit_cache = None;
    }

    /// Swap in a new configuration. Takes effect as a fresh session.
    pub fn reconfigure(&mut self, config: SessionConfig, now: OffsetDateTime) -> Result<(), CoreError> {
        config.validate()?;
        self.config = config;
        self.reset(now);
        Ok(())
    }
}
