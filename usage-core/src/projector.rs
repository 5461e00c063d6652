//! Linear usage projection.
//!
//! Two horizons: the next reading (OLS trend over reading index) and a full
//! period (average rate per tick scaled to the period, then billed).
//! Everything here is a pure function of its inputs, so the same sequence
//! always yields bit-identical forecasts.

use std::{collections::BTreeMap, fmt, time::Duration};

use time::Date;

use crate::{
    billing::compute_bill,
    domain::{SlabTable, UsageReading, UsageSequence},
    error::{BillingError, CoreError},
    round_to,
};

pub const DEFAULT_MIN_SAMPLES: usize = 10;
pub const DEFAULT_MIN_DAYS: usize = 2;

/// A forecast, or the reason it is not available yet.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize),
    serde(tag = "status", content = "value", rename_all = "snake_case")
)]
pub enum Forecast<T> {
    Ready(T),
    NotEnoughData(Shortfall),
}

impl<T> Forecast<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Forecast::Ready(v) => Some(v),
            Forecast::NotEnoughData(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Forecast::Ready(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Forecast<U> {
        match self {
            Forecast::Ready(v) => Forecast::Ready(f(v)),
            Forecast::NotEnoughData(s) => Forecast::NotEnoughData(s),
        }
    }
}

/// Why a forecast is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "snake_case"))]
pub enum Shortfall {
    Samples { have: usize, need: usize },
    Days { have: usize, need: usize },
    NoElapsedTime,
    /// The elapsed span is too short to scale to a full period.
    ElapsedTooShort,
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shortfall::Samples { have, need } => write!(f, "waiting for readings ({have}/{need})"),
            Shortfall::Days { have, need } => write!(f, "waiting for whole days of data ({have}/{need})"),
            Shortfall::NoElapsedTime => write!(f, "no elapsed time to average over"),
            Shortfall::ElapsedTooShort => write!(f, "elapsed time too short to project a period"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectorConfig {
    min_samples: usize,
    min_days: usize,
}

impl ProjectorConfig {
    /// Both thresholds must be at least 2; a line needs two distinct points.
    pub fn new(min_samples: usize, min_days: usize) -> Result<Self, CoreError> {
        if min_samples < 2 {
            return Err(CoreError::InvalidConfiguration(format!(
                "projector min_samples must be at least 2, got {min_samples}"
            )));
        }
        if min_days < 2 {
            return Err(CoreError::InvalidConfiguration(format!(
                "projector min_days must be at least 2, got {min_days}"
            )));
        }
        Ok(Self { min_samples, min_days })
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn min_days(&self) -> usize {
        self.min_days
    }
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            min_days: DEFAULT_MIN_DAYS,
        }
    }
}

/// Ordinary-least-squares line `value = slope * index + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrendModel {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendModel {
    /// Fit over `(i, values[i])`. `None` for fewer than two points.
    pub fn fit<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let values = values.into_iter();
        let (count, sum) = values.clone().fold((0usize, 0.0), |(c, s), v| (c + 1, s + v));
        if count < 2 {
            return None;
        }

        let n = count as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = sum / n;

        let (sxy, sxx) = values
            .enumerate()
            .fold((0.0, 0.0), |(sxy, sxx), (i, y)| {
                let dx = i as f64 - mean_x;
                (sxy + dx * (y - mean_y), sxx + dx * dx)
            });

        let slope = sxy / sxx;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn at(&self, index: f64) -> f64 {
        self.slope * index + self.intercept
    }
}

/// Trend fit over the whole sequence once `min_samples` readings exist.
pub fn trend(sequence: &UsageSequence, config: &ProjectorConfig) -> Forecast<TrendModel> {
    let have = sequence.len();
    if have < config.min_samples {
        return Forecast::NotEnoughData(Shortfall::Samples {
            have,
            need: config.min_samples,
        });
    }

    match TrendModel::fit(sequence.values()) {
        Some(model) => Forecast::Ready(model),
        None => Forecast::NotEnoughData(Shortfall::Samples { have, need: 2 }),
    }
}

/// The trend line evaluated one step past the last reading, to 3 decimals.
pub fn predict_next(sequence: &UsageSequence, config: &ProjectorConfig) -> Forecast<f64> {
    let n = sequence.len() as f64;
    trend(sequence, config).map(|model| round_to(model.at(n), 3))
}

/// How much of the session has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elapsed {
    Ticks(u64),
    Time(Duration),
}

/// Target horizon for [`project_period`], in units of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionPeriod {
    length: Duration,
    tick: Duration,
}

impl ProjectionPeriod {
    pub fn new(length: Duration, tick: Duration) -> Result<Self, CoreError> {
        if tick.is_zero() {
            return Err(CoreError::InvalidConfiguration(
                "projection tick duration must be positive".to_string(),
            ));
        }
        if length.is_zero() {
            return Err(CoreError::InvalidConfiguration(
                "projection period length must be positive".to_string(),
            ));
        }
        Ok(Self { length, tick })
    }

    /// Thirty days of hourly readings.
    pub fn monthly_hourly() -> Self {
        Self {
            length: Duration::from_secs(30 * 24 * 3600),
            tick: Duration::from_secs(3600),
        }
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn ticks_per_period(&self) -> f64 {
        self.length.as_secs_f64() / self.tick.as_secs_f64()
    }

    pub fn elapsed_ticks(&self, elapsed: Elapsed) -> f64 {
        match elapsed {
            Elapsed::Ticks(n) => n as f64,
            Elapsed::Time(d) => d.as_secs_f64() / self.tick.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PeriodProjection {
    pub rate_per_tick: f64,
    pub total_kwh: f64,
    pub bill: f64,
}

/// Average usage per elapsed tick, scaled to a whole period and billed.
pub fn project_period(
    sequence: &UsageSequence,
    elapsed: Elapsed,
    period: &ProjectionPeriod,
    slabs: &SlabTable,
    config: &ProjectorConfig,
) -> Result<Forecast<PeriodProjection>, BillingError> {
    let have = sequence.len();
    if have < config.min_samples {
        return Ok(Forecast::NotEnoughData(Shortfall::Samples {
            have,
            need: config.min_samples,
        }));
    }

    let elapsed_ticks = period.elapsed_ticks(elapsed);
    if elapsed_ticks.is_nan() || elapsed_ticks <= 0.0 {
        return Ok(Forecast::NotEnoughData(Shortfall::NoElapsedTime));
    }

    let rate_per_tick = sequence.total_kwh() / elapsed_ticks;
    let raw_total = rate_per_tick * period.ticks_per_period();
    if !raw_total.is_finite() {
        return Ok(Forecast::NotEnoughData(Shortfall::ElapsedTooShort));
    }

    // Bill the unrounded total; only the reported figures are rounded.
    Ok(Forecast::Ready(PeriodProjection {
        rate_per_tick,
        total_kwh: round_to(raw_total, 2),
        bill: compute_bill(raw_total, slabs)?,
    }))
}

/// Per-day usage totals in date order. Readings without a timestamp are skipped.
pub fn daily_totals(readings: &[UsageReading]) -> Vec<(Date, f64)> {
    let mut days: BTreeMap<Date, f64> = BTreeMap::new();
    for reading in readings {
        if let Some(ts) = reading.ts {
            *days.entry(ts.date()).or_default() += reading.kwh;
        }
    }
    days.into_iter().collect()
}

/// Trend over daily totals, evaluated for the day after the last one seen.
pub fn predict_next_day(readings: &[UsageReading], config: &ProjectorConfig) -> Forecast<f64> {
    let days = daily_totals(readings);
    if days.len() < config.min_days {
        return Forecast::NotEnoughData(Shortfall::Days {
            have: days.len(),
            need: config.min_days,
        });
    }

    let n = days.len() as f64;
    match TrendModel::fit(days.iter().map(|(_, kwh)| *kwh)) {
        Some(model) => Forecast::Ready(round_to(model.at(n), 3)),
        None => Forecast::NotEnoughData(Shortfall::Days { have: days.len(), need: 2 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateSlab;
    use time::macros::datetime;

    fn slabs() -> SlabTable {
        SlabTable::new(vec![
            RateSlab::new(3.0, 5.0),
            RateSlab::new(6.0, 7.0),
            RateSlab::new(f64::INFINITY, 9.0),
        ])
        .unwrap()
    }

    #[test]
    fn recovers_perfect_trend() {
        let seq = UsageSequence::from_values((1..=10).map(f64::from)).unwrap();
        let model = TrendModel::fit(seq.values()).unwrap();
        assert!((model.slope - 1.0).abs() < 1e-12);
        assert!((model.intercept - 1.0).abs() < 1e-12);

        let next = predict_next(&seq, &ProjectorConfig::default()).ready().unwrap();
        assert!((next - 11.0).abs() < 1e-9, "got {next}");
    }

    #[test]
    fn below_threshold_is_not_enough_data() {
        let config = ProjectorConfig::default();
        for len in 0..config.min_samples() {
            let seq = UsageSequence::from_values((0..len).map(|i| i as f64 * 0.1)).unwrap();
            assert_eq!(
                predict_next(&seq, &config),
                Forecast::NotEnoughData(Shortfall::Samples {
                    have: len,
                    need: config.min_samples()
                })
            );
        }

        let seq = UsageSequence::from_values((0..config.min_samples()).map(|i| i as f64 * 0.1))
            .unwrap();
        assert!(predict_next(&seq, &config).is_ready());
    }

    #[test]
    fn prediction_is_deterministic() {
        let seq = UsageSequence::from_values([0.12, 0.51, 0.33, 0.07, 0.44, 0.29, 0.58, 0.16, 0.4, 0.21])
            .unwrap();
        let config = ProjectorConfig::default();
        let a = predict_next(&seq, &config).ready().unwrap();
        let b = predict_next(&seq, &config).ready().unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn prediction_is_rounded_to_three_places() {
        let seq = UsageSequence::from_values([0.1234, 0.2345, 0.1111, 0.3333, 0.2222]).unwrap();
        let config = ProjectorConfig::new(5, 2).unwrap();
        let next = predict_next(&seq, &config).ready().unwrap();
        assert_eq!(next, round_to(next, 3));
    }

    #[test]
    fn flat_sequence_predicts_its_level() {
        let seq = UsageSequence::from_values([0.25; 12]).unwrap();
        let next = predict_next(&seq, &ProjectorConfig::default()).ready().unwrap();
        assert_eq!(next, 0.25);
    }

    #[test]
    fn config_rejects_thresholds_below_two() {
        assert!(matches!(
            ProjectorConfig::new(1, 2),
            Err(CoreError::InvalidConfiguration(_))
        ));
        assert!(ProjectorConfig::new(10, 1).is_err());
    }

    #[test]
    fn zero_elapsed_is_not_enough_data() {
        let seq = UsageSequence::from_values([0.5; 10]).unwrap();
        let period = ProjectionPeriod::monthly_hourly();
        let config = ProjectorConfig::default();

        for elapsed in [Elapsed::Ticks(0), Elapsed::Time(Duration::ZERO)] {
            let res = project_period(&seq, elapsed, &period, &slabs(), &config).unwrap();
            assert_eq!(res, Forecast::NotEnoughData(Shortfall::NoElapsedTime));
        }
    }

    #[test]
    fn projects_average_rate_over_period() {
        // 10 ticks of 0.5 kWh, 720 hourly ticks per 30 days.
        let seq = UsageSequence::from_values([0.5; 10]).unwrap();
        let period = ProjectionPeriod::monthly_hourly();
        let projection = project_period(
            &seq,
            Elapsed::Ticks(10),
            &period,
            &slabs(),
            &ProjectorConfig::default(),
        )
        .unwrap()
        .ready()
        .unwrap();

        assert_eq!(projection.rate_per_tick, 0.5);
        assert_eq!(projection.total_kwh, 360.0);
        assert_eq!(projection.bill, compute_bill(360.0, &slabs()).unwrap());
    }

    #[test]
    fn wall_clock_elapsed_converts_through_tick() {
        let seq = UsageSequence::from_values([0.5; 10]).unwrap();
        let period = ProjectionPeriod::monthly_hourly();
        let by_time = project_period(
            &seq,
            Elapsed::Time(Duration::from_secs(20 * 3600)),
            &period,
            &slabs(),
            &ProjectorConfig::default(),
        )
        .unwrap()
        .ready()
        .unwrap();

        // 5 kWh over 20 hourly ticks.
        assert_eq!(by_time.rate_per_tick, 0.25);
        assert_eq!(by_time.total_kwh, 180.0);
    }

    #[test]
    fn projection_bills_unrounded_total_past_boundary() {
        // Elapsed equals the period, so the projection is the session total.
        let seq = UsageSequence::from_values([0.3004; 10]).unwrap();
        let period = ProjectionPeriod::monthly_hourly();
        let projection = project_period(
            &seq,
            Elapsed::Ticks(720),
            &period,
            &slabs(),
            &ProjectorConfig::default(),
        )
        .unwrap()
        .ready()
        .unwrap();

        // 3.004 kWh: 3 @ 5 + 0.004 @ 7.
        assert_eq!(projection.total_kwh, 3.0);
        assert_eq!(projection.bill, 15.03);
        assert_eq!(projection.bill, compute_bill(3.004, &slabs()).unwrap());
    }

    #[test]
    fn vanishing_elapsed_time_is_reported_as_too_short() {
        let seq = UsageSequence::from_values([1e300; 10]).unwrap();
        let res = project_period(
            &seq,
            Elapsed::Time(Duration::from_nanos(1)),
            &ProjectionPeriod::monthly_hourly(),
            &slabs(),
            &ProjectorConfig::default(),
        )
        .unwrap();
        assert_eq!(res, Forecast::NotEnoughData(Shortfall::ElapsedTooShort));
    }

    #[test]
    fn projection_respects_sample_threshold() {
        let seq = UsageSequence::from_values([0.5; 3]).unwrap();
        let res = project_period(
            &seq,
            Elapsed::Ticks(3),
            &ProjectionPeriod::monthly_hourly(),
            &slabs(),
            &ProjectorConfig::default(),
        )
        .unwrap();
        assert!(!res.is_ready());
    }

    #[test]
    fn period_rejects_zero_tick() {
        assert!(matches!(
            ProjectionPeriod::new(Duration::from_secs(60), Duration::ZERO),
            Err(CoreError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn daily_totals_group_by_calendar_day() {
        let readings = [
            UsageReading::at(datetime!(2024-03-01 08:00:00 UTC), 1.0),
            UsageReading::at(datetime!(2024-03-01 20:00:00 UTC), 2.0),
            UsageReading::new(9.0),
            UsageReading::at(datetime!(2024-03-02 09:00:00 UTC), 4.0),
        ];
        let days = daily_totals(&readings);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0], (datetime!(2024-03-01 00:00:00 UTC).date(), 3.0));
        assert_eq!(days[1].1, 4.0);
    }

    #[test]
    fn next_day_needs_two_days() {
        let config = ProjectorConfig::default();
        let one_day = [
            UsageReading::at(datetime!(2024-03-01 08:00:00 UTC), 1.0),
            UsageReading::at(datetime!(2024-03-01 09:00:00 UTC), 1.0),
        ];
        assert_eq!(
            predict_next_day(&one_day, &config),
            Forecast::NotEnoughData(Shortfall::Days { have: 1, need: 2 })
        );

        let days = [
            UsageReading::at(datetime!(2024-03-01 08:00:00 UTC), 2.0),
            UsageReading::at(datetime!(2024-03-02 08:00:00 UTC), 3.0),
            UsageReading::at(datetime!(2024-03-03 08:00:00 UTC), 4.0),
        ];
        assert_eq!(predict_next_day(&days, &config), Forecast::Ready(5.0));
    }
}
