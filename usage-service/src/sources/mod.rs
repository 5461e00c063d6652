pub mod http_readings;
pub mod simulated;
pub mod usage_log_csv;

pub use http_readings::HttpReadingSource;
pub use simulated::SimulatedSource;
pub use usage_log_csv::UsageLogCsvSource;
