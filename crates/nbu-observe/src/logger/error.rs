use thiserror::Error;

/// Failures while installing the exporter's logger.
///
/// Messages name the `server.*` config key the value came from.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("server.log_format: unknown format {0:?} (expected text, json or journald)")]
    InvalidFormat(String),

    #[error(
        "server.log_format: journald output needs Linux and nbu-exporter built with the `journald` feature"
    )]
    JournaldUnavailable,

    #[error("server.log_level: invalid filter directive {0:?}")]
    InvalidLevel(String),

    #[error("nbu-exporter logger is already installed")]
    AlreadyInitialized,

    #[error("failed to install nbu-exporter logger: {0}")]
    Install(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_config_key() {
        let format = LoggerError::InvalidFormat("xml".into()).to_string();
        assert!(format.starts_with("server.log_format:"), "{format}");
        assert!(format.contains(r#""xml""#), "{format}");

        let level = LoggerError::InvalidLevel("loud".into()).to_string();
        assert!(level.starts_with("server.log_level:"), "{level}");

        let journald = LoggerError::JournaldUnavailable.to_string();
        assert!(journald.contains("`journald` feature"), "{journald}");
    }
}
