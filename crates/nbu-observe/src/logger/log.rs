use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the filter and output layer for `cfg` and installs them globally.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = filter(&cfg.level)?;
    let output = output_layer(cfg)?;

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()
        .map_err(|e| classify(e.to_string()))
}

pub(crate) fn filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let level = level.trim();
    if level.is_empty() {
        return Err(LoggerError::InvalidLevel(level.to_string()));
    }
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLevel(level.to_string()))
}

fn output_layer(cfg: &LoggerConfig) -> Result<BoxedLayer, LoggerError> {
    match cfg.format {
        LoggerFormat::Text => Ok(fmt::layer()
            .with_ansi(cfg.color)
            .with_target(true)
            .with_timer(timer())
            .boxed()),
        LoggerFormat::Json => Ok(fmt::layer()
            .json()
            .flatten_event(true)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer())
            .boxed()),
        LoggerFormat::Journald => journald_layer(),
    }
}

fn timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn classify(message: String) -> LoggerError {
    if message.contains("SetGlobalDefaultError") || message.contains("global default") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::Install(message)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    tracing_journald::layer()
        .map(|layer| layer.with_syslog_identifier("nbu-exporter".to_string()).boxed())
        .map_err(|e| LoggerError::Install(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}
