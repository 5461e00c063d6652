use super::UsageReading;
use crate::error::CoreError;

/// Append-only readings of one session. Cleared only by [`UsageSequence::reset`].
#[derive(Debug, Clone, Default)]
pub struct UsageSequence {
    readings: Vec<UsageReading>,
    total_kwh: f64,
}

impl UsageSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence from bare values, indexed in iteration order.
    pub fn from_values<I>(values: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut seq = Self::new();
        for kwh in values {
            seq.push(UsageReading::new(kwh))?;
        }
        Ok(seq)
    }

    /// Append a reading and return its index. A reading that would push the
    /// running total out of finite range is rejected and nothing changes.
    pub fn push(&mut self, reading: UsageReading) -> Result<usize, CoreError> {
        reading.validate()?;
        let total_kwh = self.total_kwh + reading.kwh;
        if !total_kwh.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "reading of {} kWh overflows the session total",
                reading.kwh
            )));
        }
        self.readings.push(reading);
        self.total_kwh = total_kwh;
        Ok(self.readings.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[UsageReading] {
        &self.readings
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.readings.iter().map(|r| r.kwh)
    }

    pub fn last(&self) -> Option<&UsageReading> {
        self.readings.last()
    }

    pub fn total_kwh(&self) -> f64 {
        self.total_kwh
    }

    /// Running total after each reading.
    pub fn cumulative(&self) -> Vec<f64> {
        self.values()
            .scan(0.0, |acc, v| {
                *acc += v;
                Some(*acc)
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.readings.clear();
        self.total_kwh = 0.0;
    }
}
