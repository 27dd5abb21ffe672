use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// Logger settings taken from the `server` section of the exporter config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// `server.log_format`.
    pub format: LoggerFormat,
    /// `server.log_level`: an `EnvFilter` directive such as `info,nbu_client=debug`.
    pub level: String,
    /// ANSI colors in text output; json and journald ignore it.
    pub color: bool,
}

impl LoggerConfig {
    /// Colors are enabled only when stdout is a terminal.
    pub fn new(format: LoggerFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
            color: format == LoggerFormat::Text && std::io::stdout().is_terminal(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new(LoggerFormat::Text, "info")
    }
}
