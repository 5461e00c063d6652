pub mod rate_slab;
pub mod usage_reading;
pub mod usage_sequence;

pub use rate_slab::{RateSlab, SlabTable};
pub use usage_reading::UsageReading;
pub use usage_sequence::UsageSequence;
