use time::OffsetDateTime;

use crate::error::CoreError;

/// One metered value in kWh. Its sequence index is its position in the
/// owning [`UsageSequence`](super::UsageSequence).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsageReading {
    #[cfg_attr(feature = "serde", serde(default, with = "time::serde::rfc3339::option"))]
    pub ts: Option<OffsetDateTime>,
    pub kwh: f64,
}

impl UsageReading {
    pub fn new(kwh: f64) -> Self {
        Self { ts: None, kwh }
    }

    pub fn at(ts: OffsetDateTime, kwh: f64) -> Self {
        Self { ts: Some(ts), kwh }
    }

    /// Readings must be finite and non-negative.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.kwh.is_finite() || self.kwh < 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "reading must be a non-negative kWh value, got {}",
                self.kwh
            )));
        }
        Ok(())
    }
}
