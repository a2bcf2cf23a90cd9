//! Telemetry for ctester.
//!
//! Structured logging only. Output is stderr or a file; stdout stays free
//! for the peer's report channel.

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
