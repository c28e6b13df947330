//! # kinsight Utilities
//!
//! Shared helpers for the kinsight workspace, currently the logging setup
//! built on `tracing`.
//!
//! Library crates only emit events; binaries and tests call one of the
//! `init_logging*` functions once to decide where those events go.

pub mod logging;

pub use logging::{
    init_logging, init_logging_with, init_logging_with_level, LogConfig, LogFormat, LogLevel, LoggingError,
    LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
