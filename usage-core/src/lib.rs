//! Slab billing and linear usage projection for household electricity readings.

pub mod anomaly;
pub mod billing;
pub mod domain;
pub mod error;
pub mod projector;
pub mod session;

pub use billing::compute_bill;
pub use domain::{RateSlab, SlabTable, UsageReading, UsageSequence};
pub use error::{BillingError, CoreError};
pub use projector::{predict_next, project_period, Elapsed, Forecast, ProjectionPeriod, ProjectorConfig, Shortfall};
pub use session::{Session, SessionConfig};

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
