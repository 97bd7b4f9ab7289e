//! # guardmap Utilities
//!
//! Shared logging setup for the guardmap binaries.
//!
//! Logs go to stderr (and optionally a file) so stdout carries nothing but
//! report lines.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_with, init_logging_with_level, LogFormat, LogLevel, LoggingConfig, LoggingError,
    LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
