pub mod session;

pub use session::{shared, SessionSink, SharedSession};
