//! Logging bootstrap for the NetBackup exporter.
//!
//! ```rust,no_run
//! use nbu_observe::{LoggerConfig, LoggerFormat, logger_init};
//!
//! let cfg = LoggerConfig::new(LoggerFormat::Json, "info,nbu_client=debug");
//! logger_init(&cfg).expect("logger");
//! ```

mod logger;
pub use logger::*;
