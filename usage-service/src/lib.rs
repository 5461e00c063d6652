pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod replay;
pub mod sinks;
pub mod sources;
pub mod transform;
pub mod usage_log;

pub use pipeline::{Envelope, Origin, Pipeline};
